use chrono::{DateTime, Duration, Utc};
use sgp4::{Constants, MinutesSinceEpoch};

use crate::predict::error::{ElementError, PredictError};
use crate::predict::types::{OrbitalElements, StateVector};

pub const DEFAULT_VALIDITY: Duration = Duration::days(14);

/// SGP4/SDP4 model for one element set.
///
/// Everything is derived once from the immutable elements, so an `Ephemeris`
/// can be shared between threads and queried in any order: the same time
/// always produces the same state.
pub struct Ephemeris {
    elements: OrbitalElements,
    constants: Constants,
    validity: Duration,
}

impl std::fmt::Debug for Ephemeris {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ephemeris")
            .field("elements", &self.elements)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl Ephemeris {
    pub fn new(elements: OrbitalElements, validity: Duration) -> Result<Self, ElementError> {
        check_elements(&elements)?;

        let constants = Constants::from_elements(&elements.to_sgp4()).map_err(|e| {
            ElementError::Degenerate {
                norad_id: elements.norad_id,
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            elements,
            constants,
            validity,
        })
    }

    pub fn from_elements(elements: OrbitalElements) -> Result<Self, ElementError> {
        Self::new(elements, DEFAULT_VALIDITY)
    }

    pub fn elements(&self) -> &OrbitalElements {
        &self.elements
    }

    /// True when `time` is inside the window where these elements are trusted.
    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        let age = self.elements.age_at(time);
        age <= self.validity && age >= -self.validity
    }

    pub fn propagate(&self, time: DateTime<Utc>) -> Result<StateVector, PredictError> {
        let age = self.elements.age_at(time);
        if !self.is_valid_at(time) {
            return Err(ElementError::Stale {
                norad_id: self.elements.norad_id,
                age_days: age.num_seconds() as f64 / 86_400.0,
            }
            .into());
        }

        let prediction = self
            .constants
            .propagate(MinutesSinceEpoch(minutes(age)))
            .map_err(|e| PredictError::Propagation {
                norad_id: self.elements.norad_id,
                message: e.to_string(),
            })?;

        Ok(StateVector {
            timestamp: time,
            position_km: prediction.position,
            velocity_km_s: prediction.velocity,
        })
    }
}

/// One-shot propagation with the default validity window.
pub fn propagate(elements: &OrbitalElements, time: DateTime<Utc>) -> Result<StateVector, PredictError> {
    Ephemeris::from_elements(elements.clone())?.propagate(time)
}

fn minutes(age: Duration) -> f64 {
    match age.num_microseconds() {
        Some(us) => us as f64 / 60_000_000.0,
        None => age.num_milliseconds() as f64 / 60_000.0,
    }
}

fn check_elements(elements: &OrbitalElements) -> Result<(), ElementError> {
    let fail = |reason: &str| {
        Err(ElementError::Degenerate {
            norad_id: elements.norad_id,
            reason: reason.to_string(),
        })
    };

    let values = [
        elements.inclination_deg,
        elements.raan_deg,
        elements.eccentricity,
        elements.arg_perigee_deg,
        elements.mean_anomaly_deg,
        elements.mean_motion,
        elements.drag_term,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return fail("non-finite element");
    }
    if !(0.0..1.0).contains(&elements.eccentricity) {
        return fail("eccentricity outside [0, 1)");
    }
    if !(0.0..=180.0).contains(&elements.inclination_deg) {
        return fail("inclination outside [0, 180] degrees");
    }
    if elements.mean_motion <= 0.0 {
        return fail("mean motion must be positive");
    }
    Ok(())
}
