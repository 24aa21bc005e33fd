use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::predict::error::ElementError;

pub type SatelliteId = u32;

/// Mean orbital elements of one satellite at an epoch, as carried by a TLE.
///
/// Never edited in place: a refresh replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OrbitalElements {
    pub name: Option<String>,
    pub norad_id: SatelliteId,
    pub epoch: DateTime<Utc>,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    /// Revolutions per day.
    pub mean_motion: f64,
    /// B* drag term, 1/earth radii.
    pub drag_term: f64,
}

impl OrbitalElements {
    pub fn age_at(&self, time: DateTime<Utc>) -> Duration {
        time - self.epoch
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("NORAD {}", self.norad_id))
    }

    /// The propagator's view of these elements. Fields a TLE carries but
    /// SGP4 ignores are left at zero.
    pub fn to_sgp4(&self) -> sgp4::Elements {
        sgp4::Elements {
            object_name: self.name.clone(),
            international_designator: None,
            norad_id: self.norad_id as u64,
            classification: sgp4::Classification::Unclassified,
            datetime: self.epoch.naive_utc(),
            mean_motion_dot: 0.0,
            mean_motion_ddot: 0.0,
            drag_term: self.drag_term,
            element_set_number: 0,
            inclination: self.inclination_deg,
            right_ascension: self.raan_deg,
            eccentricity: self.eccentricity,
            argument_of_perigee: self.arg_perigee_deg,
            mean_anomaly: self.mean_anomaly_deg,
            mean_motion: self.mean_motion,
            revolution_number: 0,
            ephemeris_type: 0,
        }
    }
}

impl TryFrom<sgp4::Elements> for OrbitalElements {
    type Error = ElementError;

    fn try_from(elements: sgp4::Elements) -> Result<Self, Self::Error> {
        let norad_id = SatelliteId::try_from(elements.norad_id).map_err(|_| {
            ElementError::Malformed {
                line: 1,
                message: format!("catalog number {} out of range", elements.norad_id),
            }
        })?;
        Ok(Self {
            name: elements.object_name.filter(|n| !n.is_empty()),
            norad_id,
            epoch: elements.datetime.and_utc(),
            inclination_deg: elements.inclination,
            raan_deg: elements.right_ascension,
            eccentricity: elements.eccentricity,
            arg_perigee_deg: elements.argument_of_perigee,
            mean_anomaly_deg: elements.mean_anomaly,
            mean_motion: elements.mean_motion,
            drag_term: elements.drag_term,
        })
    }
}

/// Inertial (TEME) position and velocity at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateVector {
    pub timestamp: DateTime<Utc>,
    pub position_km: [f64; 3],
    pub velocity_km_s: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct LookAngle {
    pub timestamp: DateTime<Utc>,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    /// Positive when the satellite is receding.
    pub range_rate_km_s: f64,
}

/// One visibility window above the elevation mask.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PassEvent {
    pub satellite: SatelliteId,
    pub rise: DateTime<Utc>,
    pub culmination: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub set: DateTime<Utc>,
    pub rise_azimuth_deg: f64,
    pub set_azimuth_deg: f64,
    pub min_elevation_deg: f64,
    /// Already above the mask when the search window opened.
    pub truncated_start: bool,
    /// Still above the mask when the search window closed.
    pub truncated_end: bool,
}

impl PassEvent {
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.rise <= time && time <= self.set
    }

    pub fn duration(&self) -> Duration {
        self.set - self.rise
    }
}
