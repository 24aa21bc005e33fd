use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;
use utoipa::ToSchema;

use crate::predict::{LookAngle, SatelliteId};
use crate::tracker::actuator::{AchievedAngle, PointingCommand, SignalQuality};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrackStatus {
    Idle,
    Tracking,
    Handover,
    Degraded,
    Stowing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FaultCode {
    ActuatorTimeout,
    ActuatorRejected,
    ActuatorDisconnected,
    SensorTimeout,
    SensorUnavailable,
    Geometry,
    Propagation,
    MissingEphemeris,
    PassDegraded,
    StaleElements,
    InvalidElements,
}

/// One row per control tick.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TelemetrySample {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub status: TrackStatus,
    pub satellite: Option<SatelliteId>,
    pub commanded: Option<PointingCommand>,
    pub achieved: Option<AchievedAngle>,
    pub look: Option<LookAngle>,
    pub doppler_shift_hz: Option<f64>,
    pub tuned_hz: Option<f64>,
    pub path_loss_db: Option<f64>,
    pub signal: Option<SignalQuality>,
    pub faults: Vec<FaultCode>,
}

impl TelemetrySample {
    pub fn new(tick: u64, timestamp: DateTime<Utc>, status: TrackStatus) -> Self {
        Self {
            tick,
            timestamp,
            status,
            satellite: None,
            commanded: None,
            achieved: None,
            look: None,
            doppler_shift_hz: None,
            tuned_hz: None,
            path_loss_db: None,
            signal: None,
            faults: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only destination for samples. A failing sink never stops tracking.
pub trait TelemetrySink: Send {
    fn append(&mut self, sample: &TelemetrySample) -> Result<(), TelemetryError>;
}

/// Newline-delimited JSON, one sample per line.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self, TelemetryError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl TelemetrySink for JsonLinesSink {
    fn append(&mut self, sample: &TelemetrySample) -> Result<(), TelemetryError> {
        serde_json::to_writer(&mut self.writer, sample)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes samples to the log at debug level.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn append(&mut self, sample: &TelemetrySample) -> Result<(), TelemetryError> {
        match &sample.look {
            Some(look) => log::debug!(
                "tick {} {} sat={:?} az={:.2} el={:.2} range={:.1}km faults={:?}",
                sample.tick,
                sample.status,
                sample.satellite,
                look.azimuth_deg,
                look.elevation_deg,
                look.range_km,
                sample.faults
            ),
            None => log::debug!(
                "tick {} {} faults={:?}",
                sample.tick,
                sample.status,
                sample.faults
            ),
        }
        Ok(())
    }
}

/// Fans a sample out to several sinks; the first error is reported after
/// every sink has been tried.
#[derive(Default)]
pub struct TelemetryFanout {
    sinks: Vec<Box<dyn TelemetrySink>>,
}

impl TelemetryFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl TelemetrySink for TelemetryFanout {
    fn append(&mut self, sample: &TelemetrySample) -> Result<(), TelemetryError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.append(sample) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
