use std::time::Duration;

use thiserror::Error;

use crate::delegation::client::TaskId;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DelegationError {
    #[error("not connected to delegation agent")]
    NotConnected,
    #[error("invalid delegation config: {0}")]
    InvalidConfig(String),
    #[error("invalid task: {0}")]
    InvalidTask(String),
    #[error("task {0} not found")]
    UnknownTask(TaskId),
    #[error("delegation agent did not answer within {0:?}")]
    Timeout(Duration),
    #[error("delegation transport error: {0}")]
    Transport(String),
}

impl DelegationError {
    /// Worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, DelegationError::Timeout(_) | DelegationError::Transport(_))
    }
}
