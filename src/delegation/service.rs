use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::delegation::client::{DelegationClient, TaskId, TaskStatus};
use crate::delegation::config::DelegationConfig;
use crate::delegation::error::DelegationError;
use crate::scheduler::Priority;
use crate::tracker::PassSummary;

pub const SIGNAL_ANALYSIS_TASK: &str = "signal_analysis";

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub task_type: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Tracks tasks handed to a delegation agent.
///
/// Tasks are indexed by id; listing preserves submission order.
pub struct DelegationService<C: DelegationClient> {
    client: C,
    config: DelegationConfig,
    tasks: HashMap<TaskId, TaskRecord>,
    order: Vec<TaskId>,
}

impl<C: DelegationClient> DelegationService<C> {
    pub fn new(client: C, config: DelegationConfig) -> Result<Self, DelegationError> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            tasks: HashMap::new(),
            order: Vec::new(),
        })
    }

    #[cfg(test)]
    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn connect(&mut self) -> Result<(), DelegationError> {
        self.client.connect().await?;
        log::info!("Connected to delegation agent at {}", self.config.endpoint);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    fn check_connected(&self) -> Result<(), DelegationError> {
        if self.client.is_connected() {
            Ok(())
        } else {
            Err(DelegationError::NotConnected)
        }
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, DelegationError>>,
    ) -> Result<T, DelegationError> {
        tokio::time::timeout(self.config.timeout, call)
            .await
            .unwrap_or(Err(DelegationError::Timeout(self.config.timeout)))
    }

    /// Submits a task. `payload` must be a JSON object; the priority is
    /// added to it under `"priority"`.
    pub async fn delegate_task(
        &mut self,
        task_type: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<TaskId, DelegationError> {
        self.check_connected()?;
        if task_type.trim().is_empty() {
            return Err(DelegationError::InvalidTask(
                "task type must be a non-empty string".into(),
            ));
        }
        let serde_json::Value::Object(mut fields) = payload else {
            return Err(DelegationError::InvalidTask(
                "payload must be a JSON object".into(),
            ));
        };
        fields.insert(
            "priority".into(),
            serde_json::Value::String(priority.to_string()),
        );
        let payload = serde_json::Value::Object(fields);

        let mut attempt = 0;
        let task_id = loop {
            match self
                .with_timeout(self.client.submit_task(task_type, &payload, priority))
                .await
            {
                Ok(id) => break id,
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    log::warn!("Submitting {} task failed ({}), retry {}", task_type, e, attempt);
                }
                Err(e) => return Err(e),
            }
        };

        self.order.push(task_id.clone());
        self.tasks.insert(
            task_id.clone(),
            TaskRecord {
                task_id: task_id.clone(),
                task_type: task_type.to_string(),
                priority,
                status: TaskStatus::Submitted,
                submitted_at: Utc::now(),
            },
        );
        Ok(task_id)
    }

    #[cfg(test)]
    pub fn task(&self, task_id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.get(task_id)
    }

    /// Every tracked task, oldest submission first.
    pub fn queue_status(&self) -> Vec<TaskRecord> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .collect()
    }

    pub async fn refresh_task_status(&mut self, task_id: &TaskId) -> Result<TaskStatus, DelegationError> {
        self.check_connected()?;
        if !self.tasks.contains_key(task_id) {
            return Err(DelegationError::UnknownTask(task_id.clone()));
        }
        let status = self.with_timeout(self.client.get_status(task_id)).await?;
        if let Some(record) = self.tasks.get_mut(task_id) {
            record.status = status;
        }
        Ok(status)
    }

    /// Refreshes every task. Tasks that fail to refresh keep their last
    /// known status and are left out of the result.
    pub async fn refresh_all(&mut self) -> Result<Vec<(TaskId, TaskStatus)>, DelegationError> {
        self.check_connected()?;
        let mut updated = Vec::with_capacity(self.order.len());
        for task_id in self.order.clone() {
            match self.refresh_task_status(&task_id).await {
                Ok(status) => updated.push((task_id, status)),
                Err(e) => log::warn!("Could not refresh task {}: {}", task_id, e),
            }
        }
        Ok(updated)
    }

    /// Drops completed, failed and cancelled tasks. Returns how many went.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.order.len();
        self.tasks.retain(|_, record| !record.status.is_finished());
        let tasks = &self.tasks;
        self.order.retain(|id| tasks.contains_key(id));
        before - self.order.len()
    }
}

/// Submits one signal-analysis task per finished pass until the sending
/// side closes. Failures are logged and the summary is dropped.
pub async fn forward_pass_summaries<C: DelegationClient>(
    service: &mut DelegationService<C>,
    rx: &mut mpsc::Receiver<PassSummary>,
) {
    while let Some(summary) = rx.recv().await {
        let priority = if summary.degraded {
            Priority::High
        } else {
            Priority::Low
        };
        let payload = match serde_json::to_value(&summary) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Could not encode pass summary: {}", e);
                continue;
            }
        };
        match service
            .delegate_task(SIGNAL_ANALYSIS_TASK, payload, priority)
            .await
        {
            Ok(task_id) => log::info!(
                "Delegated analysis of pass of {} as task {}",
                summary.satellite,
                task_id
            ),
            Err(e) => log::warn!(
                "Could not delegate analysis of pass of {}: {}",
                summary.satellite,
                e
            ),
        }

        if let Err(e) = service.refresh_all().await {
            log::warn!("Could not refresh delegated tasks: {}", e);
        }
        let cleared = service.clear_finished();
        if cleared > 0 {
            log::debug!("Cleared {} finished delegated tasks", cleared);
        }
    }
}
