mod actuator;
mod error;
mod simulated;
mod slew;
mod telemetry;
mod tracker;

pub use actuator::AchievedAngle;
pub use simulated::SimulatedMount;
pub use telemetry::{
    FaultCode, JsonLinesSink, LogSink, TelemetryFanout, TelemetrySample, TrackStatus,
};
pub use tracker::{
    Clock, PassSummary, StatusHandle, TrackerReport, TrackerStatus, TrackingLoop, TrackingSettings,
};
