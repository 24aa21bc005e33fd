use crate::tracker::actuator::{AchievedAngle, PointingCommand};

/// Signed shortest azimuth change from `from` to `to`, in (-180, 180].
pub fn azimuth_delta(from: f64, to: f64) -> f64 {
    let delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Largest of the azimuth and elevation errors, azimuth taken the short way.
pub fn pointing_error(
    achieved: &AchievedAngle,
    azimuth_deg: f64,
    elevation_deg: f64,
) -> f64 {
    azimuth_delta(achieved.azimuth_deg, azimuth_deg)
        .abs()
        .max((achieved.elevation_deg - elevation_deg).abs())
}

/// Rate-limits the setpoint so each tick moves at most `max_rate × dt` per
/// axis, and keeps elevation inside the mount's limits.
#[derive(Debug, Clone, Copy)]
pub struct SlewLimiter {
    pub max_rate_deg_s: f64,
    pub min_elevation_deg: f64,
    pub max_elevation_deg: f64,
}

impl SlewLimiter {
    pub fn new(max_rate_deg_s: f64) -> Self {
        Self {
            max_rate_deg_s,
            min_elevation_deg: 0.0,
            max_elevation_deg: 90.0,
        }
    }

    pub fn step(
        &self,
        current: &AchievedAngle,
        azimuth_deg: f64,
        elevation_deg: f64,
        dt_seconds: f64,
    ) -> AchievedAngle {
        let max_delta = self.max_rate_deg_s * dt_seconds;

        let az_step = azimuth_delta(current.azimuth_deg, azimuth_deg).clamp(-max_delta, max_delta);
        let target_el = elevation_deg.clamp(self.min_elevation_deg, self.max_elevation_deg);
        let el_step = (target_el - current.elevation_deg).clamp(-max_delta, max_delta);

        AchievedAngle {
            azimuth_deg: (current.azimuth_deg + az_step).rem_euclid(360.0),
            elevation_deg: (current.elevation_deg + el_step)
                .clamp(self.min_elevation_deg, self.max_elevation_deg),
        }
    }

    /// Command for the next tick. During a handover the rate is sent
    /// explicitly so the mount slews flat out.
    pub fn command(
        &self,
        current: &AchievedAngle,
        azimuth_deg: f64,
        elevation_deg: f64,
        dt_seconds: f64,
        handover: bool,
    ) -> PointingCommand {
        let next = self.step(current, azimuth_deg, elevation_deg, dt_seconds);
        PointingCommand {
            azimuth_deg: next.azimuth_deg,
            elevation_deg: next.elevation_deg,
            max_rate_deg_s: handover.then_some(self.max_rate_deg_s),
        }
    }
}
