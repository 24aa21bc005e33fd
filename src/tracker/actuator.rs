use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Setpoint sent to the mount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct PointingCommand {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    /// Explicit slew rate, deg/s. `None` lets the mount use its own profile.
    pub max_rate_deg_s: Option<f64>,
}

/// Where the mount says it ended up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct AchievedAngle {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct SignalQuality {
    pub snr_db: f64,
    pub locked: bool,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActuatorFault {
    #[error("actuator did not answer within {0:?}")]
    Timeout(Duration),
    #[error("actuator rejected command: {0}")]
    Rejected(String),
    #[error("actuator disconnected")]
    Disconnected,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorFault {
    #[error("signal sensor did not answer within {0:?}")]
    Timeout(Duration),
    #[error("signal sensor unavailable: {0}")]
    Unavailable(String),
}

/// Pointing mount plus the receiver's signal-quality readout.
///
/// The tracking loop owns its actuator exclusively. Implementations should
/// honour `timeout` themselves; the loop also cuts off calls that overrun.
#[async_trait]
pub trait Actuator: Send {
    async fn set_pointing(
        &mut self,
        command: &PointingCommand,
        timeout: Duration,
    ) -> Result<AchievedAngle, ActuatorFault>;

    async fn read_signal_quality(&mut self, timeout: Duration) -> Result<SignalQuality, SensorFault>;
}
