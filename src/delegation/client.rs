use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::delegation::error::DelegationError;
use crate::scheduler::Priority;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Submitted,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl TaskStatus {
    /// Terminal states, whether the task succeeded or not.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Remote agent that accepts auxiliary work. Never used on the pointing path.
#[async_trait]
pub trait DelegationClient: Send + Sync {
    async fn connect(&mut self) -> Result<(), DelegationError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    async fn submit_task(
        &self,
        task_type: &str,
        payload: &serde_json::Value,
        priority: Priority,
    ) -> Result<TaskId, DelegationError>;

    async fn get_status(&self, task_id: &TaskId) -> Result<TaskStatus, DelegationError>;
}

/// In-process agent. Every status poll reports where a task stands and then
/// moves it one step along `Submitted -> Processing -> Completed`; a task is
/// dropped once its terminal state has been reported.
#[derive(Debug, Default)]
pub struct LocalAgentClient {
    connected: bool,
    tasks: Mutex<HashMap<TaskId, TaskStatus>>,
}

impl LocalAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn set_status(&self, task_id: &TaskId, status: TaskStatus) {
        if let Some(current) = self.tasks().get_mut(task_id) {
            *current = status;
        }
    }

    /// Drops a task as if the agent had lost it.
    #[cfg(test)]
    pub fn forget(&self, task_id: &TaskId) {
        self.tasks().remove(task_id);
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskStatus>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_connected(&self) -> Result<(), DelegationError> {
        if self.connected {
            Ok(())
        } else {
            Err(DelegationError::NotConnected)
        }
    }
}

#[async_trait]
impl DelegationClient for LocalAgentClient {
    async fn connect(&mut self) -> Result<(), DelegationError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn submit_task(
        &self,
        task_type: &str,
        _payload: &serde_json::Value,
        priority: Priority,
    ) -> Result<TaskId, DelegationError> {
        self.check_connected()?;
        let task_id = TaskId(Uuid::new_v4().to_string());
        log::debug!("Local agent accepted {} task {} ({})", task_type, task_id, priority);
        self.tasks().insert(task_id.clone(), TaskStatus::Submitted);
        Ok(task_id)
    }

    async fn get_status(&self, task_id: &TaskId) -> Result<TaskStatus, DelegationError> {
        self.check_connected()?;
        let mut tasks = self.tasks();
        let status = tasks
            .get(task_id)
            .copied()
            .ok_or_else(|| DelegationError::UnknownTask(task_id.clone()))?;
        match status {
            TaskStatus::Submitted => {
                tasks.insert(task_id.clone(), TaskStatus::Processing);
            }
            TaskStatus::Processing => {
                tasks.insert(task_id.clone(), TaskStatus::Completed);
            }
            _ => {
                tasks.remove(task_id);
                log::debug!("Local agent finished task {} ({})", task_id, status);
            }
        }
        Ok(status)
    }
}
