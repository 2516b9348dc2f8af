//! Broker Port (spec §4.2, C2).
//!
//! Grounded on `bpmn-lite-core::store`'s job queue methods
//! (`enqueue_job`/`dequeue_jobs`/`ack_job`): send/inspect/cancel over an
//! opaque task id, with no assumption of exactly-once delivery. Duplicate
//! delivery is made safe at the job-run level, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInspection {
    pub state: TaskState,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Enqueue a task; the payload is a single JSON object (spec §6).
    /// Returns a globally unique task id.
    async fn send_task(&self, task_name: &str, args: serde_json::Value) -> Result<String>;

    async fn inspect(&self, task_id: &str) -> Result<TaskInspection>;

    async fn cancel(&self, task_id: &str) -> Result<()>;
}
