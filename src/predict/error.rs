use thiserror::Error;

use crate::predict::SatelliteId;

/// Problems with a satellite's orbital data. None of these are fatal for the
/// station: the affected satellite is left out of scheduling until its
/// elements are refreshed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ElementError {
    #[error("elements for {norad_id} are stale ({age_days:.1} days from epoch)")]
    Stale { norad_id: SatelliteId, age_days: f64 },
    #[error("degenerate orbit for {norad_id}: {reason}")]
    Degenerate {
        norad_id: SatelliteId,
        reason: String,
    },
    #[error("malformed TLE line {line}: {message}")]
    Malformed { line: u8, message: String },
    #[error("checksum mismatch on TLE line {line}")]
    Checksum { line: u8 },
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("TLE path not found: {0}")]
    PathNotFound(String),
    #[error("TLE file read error: {0}")]
    FileRead(#[from] std::io::Error),
    #[error(transparent)]
    Elements(#[from] ElementError),
    #[error("propagation error for {norad_id}: {message}")]
    Propagation {
        norad_id: SatelliteId,
        message: String,
    },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum GeometryError {
    #[error("satellite coincides with the observer")]
    ZeroRange,
    #[error("non-finite look angle")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum LinkError {
    #[error("invalid parameter: frequency must be positive, got {0} Hz")]
    InvalidFrequency(f64),
    #[error("invalid parameter: distance must be non-negative, got {0} km")]
    InvalidDistance(f64),
}
