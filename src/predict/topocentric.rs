use chrono::{DateTime, Utc};

use crate::predict::error::GeometryError;
use crate::predict::ground_station::{ObserverLocation, EARTH_ROTATION_RAD_S};
use crate::predict::types::{LookAngle, StateVector};

/// Above this elevation azimuth is numerically meaningless.
pub const ZENITH_HOLD_ELEVATION_DEG: f64 = 89.9;

const COMPASS_POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Look angle from `observer` to a satellite in `state` at `time`.
pub fn to_look_angle(
    state: &StateVector,
    observer: &ObserverLocation,
    time: DateTime<Utc>,
) -> Result<LookAngle, GeometryError> {
    let earth = EarthRotation::at(time);
    let sat = earth.rotate(state.position_km);
    // The frame itself turns, so the inertial velocity loses the ω × r term.
    let spin = EARTH_ROTATION_RAD_S;
    let vel = earth.rotate(state.velocity_km_s);
    let sat_vel = [vel[0] + spin * sat[1], vel[1] - spin * sat[0], vel[2]];

    let station = observer.position_ecef_km();
    let los = [sat[0] - station[0], sat[1] - station[1], sat[2] - station[2]];
    let range_km = dot(los, los).sqrt();
    if !range_km.is_finite() {
        return Err(GeometryError::NonFinite);
    }
    if range_km < 1e-6 {
        return Err(GeometryError::ZeroRange);
    }

    let (east, north, up) = LocalFrame::of(observer).project(los);
    let mut azimuth = east.atan2(north).to_degrees().rem_euclid(360.0);
    if azimuth >= 360.0 {
        azimuth = 0.0;
    }
    let elevation = (up / range_km).clamp(-1.0, 1.0).asin().to_degrees();

    // The station is fixed in the Earth frame, so only the satellite moves.
    let range_rate_km_s = dot(sat_vel, los) / range_km;

    if !(azimuth.is_finite() && elevation.is_finite() && range_rate_km_s.is_finite()) {
        return Err(GeometryError::NonFinite);
    }

    Ok(LookAngle {
        timestamp: time,
        azimuth_deg: azimuth,
        elevation_deg: elevation,
        range_km,
        range_rate_km_s,
    })
}

/// TEME to Earth-fixed: a turn about the pole by the sidereal angle.
struct EarthRotation {
    sin: f64,
    cos: f64,
}

impl EarthRotation {
    fn at(time: DateTime<Utc>) -> Self {
        let theta =
            sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&time.naive_utc()));
        let (sin, cos) = theta.sin_cos();
        Self { sin, cos }
    }

    fn rotate(&self, [x, y, z]: [f64; 3]) -> [f64; 3] {
        [self.cos * x + self.sin * y, self.cos * y - self.sin * x, z]
    }
}

/// East, north and up unit vectors at the observer, in Earth-fixed axes.
struct LocalFrame {
    east: [f64; 3],
    north: [f64; 3],
    up: [f64; 3],
}

impl LocalFrame {
    fn of(observer: &ObserverLocation) -> Self {
        let (sin_lat, cos_lat) = observer.lat_rad().sin_cos();
        let (sin_lon, cos_lon) = observer.lon_rad().sin_cos();
        Self {
            east: [-sin_lon, cos_lon, 0.0],
            north: [-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat],
            up: [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat],
        }
    }

    fn project(&self, v: [f64; 3]) -> (f64, f64, f64) {
        (dot(self.east, v), dot(self.north, v), dot(self.up, v))
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn is_visible(look: &LookAngle, min_elevation_deg: f64) -> bool {
    look.elevation_deg >= min_elevation_deg
}

/// 8-point compass bucket, each 45° wide and centred on its direction.
pub fn azimuth_to_direction(azimuth_deg: f64) -> &'static str {
    let index = ((azimuth_deg.rem_euclid(360.0) + 22.5) / 45.0).floor() as usize % 8;
    COMPASS_POINTS[index]
}

/// Carries the previous azimuth forward while the satellite is near zenith,
/// so the mount does not whip around on a noisy azimuth.
#[derive(Debug, Default, Clone)]
pub struct ZenithHold {
    last_azimuth_deg: Option<f64>,
}

impl ZenithHold {
    pub fn apply(&mut self, mut look: LookAngle) -> LookAngle {
        if look.elevation_deg > ZENITH_HOLD_ELEVATION_DEG {
            if let Some(azimuth) = self.last_azimuth_deg {
                look.azimuth_deg = azimuth;
            }
        }
        self.last_azimuth_deg = Some(look.azimuth_deg);
        look
    }

    pub fn reset(&mut self) {
        self.last_azimuth_deg = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::propagation::tests::{epoch, leo_elements};
    use crate::predict::propagation::Ephemeris;
    use chrono::Duration;

    fn look(azimuth_deg: f64, elevation_deg: f64) -> LookAngle {
        LookAngle {
            timestamp: epoch(),
            azimuth_deg,
            elevation_deg,
            range_km: 500.0,
            range_rate_km_s: 0.0,
        }
    }

    #[test]
    fn look_angles_stay_in_range() {
        let ephemeris = Ephemeris::from_elements(leo_elements(epoch())).unwrap();
        let observer = ObserverLocation::new(45.0, -93.0, 300.0);

        for minute in (0..24 * 60).step_by(7) {
            let t = epoch() + Duration::minutes(minute);
            let state = ephemeris.propagate(t).unwrap();
            let look = to_look_angle(&state, &observer, t).unwrap();
            assert!((0.0..360.0).contains(&look.azimuth_deg), "{look:?}");
            assert!((-90.0..=90.0).contains(&look.elevation_deg), "{look:?}");
            assert!(look.range_km >= 0.0);
            // A LEO satellite never recedes faster than its orbital speed.
            assert!(look.range_rate_km_s.abs() < 8.0);
        }
    }

    #[test]
    fn satellite_overhead_is_at_zenith() {
        // Put a synthetic satellite straight above a station on the x axis
        // at a time where GMST is folded into the rotation.
        let observer = ObserverLocation::new(0.0, 0.0, 0.0);
        let t = epoch();
        let gmst = sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&t.naive_utc()));
        let r = 6378.137 + 500.0;
        let state = StateVector {
            timestamp: t,
            position_km: [r * gmst.cos(), r * gmst.sin(), 0.0],
            velocity_km_s: [0.0, 0.0, 7.6],
        };

        let look = to_look_angle(&state, &observer, t).unwrap();
        assert!(look.elevation_deg > 89.99, "{look:?}");
        assert!((look.range_km - 500.0).abs() < 1e-6);
        // Purely transverse motion: no radial component.
        assert!(look.range_rate_km_s.abs() < 1e-6);
    }

    #[test]
    fn coincident_satellite_is_a_geometry_error() {
        let observer = ObserverLocation::new(10.0, 20.0, 0.0);
        let t = epoch();
        let gmst = sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&t.naive_utc()));
        let ecef = observer.position_ecef_km();
        // Inverse of the TEME -> ECEF rotation.
        let teme = [
            ecef[0] * gmst.cos() - ecef[1] * gmst.sin(),
            ecef[0] * gmst.sin() + ecef[1] * gmst.cos(),
            ecef[2],
        ];
        let state = StateVector {
            timestamp: t,
            position_km: teme,
            velocity_km_s: [0.0; 3],
        };
        assert_eq!(
            to_look_angle(&state, &observer, t),
            Err(GeometryError::ZeroRange)
        );
    }

    #[test]
    fn local_frame_is_orthonormal() {
        for (lat, lon) in [(0.0, 0.0), (45.0, -93.0), (-33.9, 151.2), (89.0, 10.0)] {
            let frame = LocalFrame::of(&ObserverLocation::new(lat, lon, 0.0));
            for axis in [frame.east, frame.north, frame.up] {
                assert!((dot(axis, axis) - 1.0).abs() < 1e-12);
            }
            assert!(dot(frame.east, frame.north).abs() < 1e-12);
            assert!(dot(frame.north, frame.up).abs() < 1e-12);
            assert!(dot(frame.up, frame.east).abs() < 1e-12);
        }
        // Due north of an equatorial station is the pole.
        let frame = LocalFrame::of(&ObserverLocation::new(0.0, 0.0, 0.0));
        assert_eq!(frame.project([0.0, 0.0, 1.0]), (0.0, 1.0, 0.0));
    }

    #[test]
    fn compass_buckets() {
        assert_eq!(azimuth_to_direction(0.0), "N");
        assert_eq!(azimuth_to_direction(359.9), "N");
        assert_eq!(azimuth_to_direction(22.4), "N");
        assert_eq!(azimuth_to_direction(22.5), "NE");
        assert_eq!(azimuth_to_direction(90.0), "E");
        assert_eq!(azimuth_to_direction(180.0), "S");
        assert_eq!(azimuth_to_direction(247.5), "W");
        assert_eq!(azimuth_to_direction(315.0), "NW");
        assert_eq!(azimuth_to_direction(337.5), "N");
        assert_eq!(azimuth_to_direction(-45.0), "NW");
    }

    #[test]
    fn zenith_hold_carries_azimuth_forward() {
        let mut hold = ZenithHold::default();

        assert_eq!(hold.apply(look(120.0, 80.0)).azimuth_deg, 120.0);
        assert_eq!(hold.apply(look(300.0, 89.95)).azimuth_deg, 120.0);
        assert_eq!(hold.apply(look(10.0, 89.99)).azimuth_deg, 120.0);
        assert_eq!(hold.apply(look(301.0, 85.0)).azimuth_deg, 301.0);

        hold.reset();
        // Nothing to carry forward yet.
        assert_eq!(hold.apply(look(42.0, 89.95)).azimuth_deg, 42.0);
    }

    #[test]
    fn visibility_uses_the_mask() {
        assert!(is_visible(&look(0.0, 10.0), 10.0));
        assert!(!is_visible(&look(0.0, 9.99), 10.0));
    }
}
