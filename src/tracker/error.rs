use thiserror::Error;

use crate::scheduler::SchedulingConflict;
use crate::tracker::actuator::ActuatorFault;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("actuator unavailable after {failures} consecutive failures: {last}")]
    ActuatorUnavailable { failures: u32, last: ActuatorFault },
    #[error("scheduler conflict: {0}")]
    Scheduling(#[from] SchedulingConflict),
    #[error("invalid tracker settings: {0}")]
    InvalidSettings(String),
}
