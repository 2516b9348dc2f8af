//! Persistence Port (spec §4.1, C1).
//!
//! Grounded on `bpmn-lite-core::store::ProcessStore`: a narrow
//! `#[async_trait]` trait the engine depends on exclusively, so any number
//! of backends (in-memory for tests, Postgres for production) can satisfy
//! it. Methods are expected to be safe under concurrent invocation; callers
//! never hold a transaction open across a call into another port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::job::{Execution, ExecutionStatus};
use crate::model::scheduler::{SchedulerJob, SchedulerJobFilter, SchedulerJobSpec};

#[derive(Debug, Clone)]
pub struct ExecutionPatch {
    pub status: Option<ExecutionStatus>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl ExecutionPatch {
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            finished_at: None,
            error_message: None,
            result: None,
        }
    }

    pub fn terminal(status: ExecutionStatus, finished_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            finished_at: Some(finished_at),
            error_message: None,
            result: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn list_scheduler_jobs(&self, filter: &SchedulerJobFilter) -> Result<Vec<SchedulerJob>>;

    /// Enabled rows due per spec §4.1, ordered `next_run_at ASC NULLS FIRST`.
    async fn get_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<SchedulerJob>>;

    async fn upsert_scheduler_job(&self, spec: SchedulerJobSpec) -> Result<SchedulerJob>;

    /// Atomically advances timestamps and increments `run_count`
    /// (spec §8 invariant 1: at-most-one dispatch per due instant).
    async fn mark_scheduler_job_run(
        &self,
        name: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn create_execution(&self, row: Execution) -> Result<()>;

    async fn update_execution(&self, task_id: &str, patch: ExecutionPatch) -> Result<()>;

    /// Sets `timeout` on queued/running rows older than `threshold` and
    /// returns the affected set (spec §4.1, §8 invariant 10).
    async fn reap_stale_executions(&self, threshold: chrono::Duration) -> Result<Vec<Execution>>;

    async fn get_job_definition(&self, id: &str) -> Result<Option<serde_json::Value>>;

    async fn upsert_job_definition(&self, id: &str, definition: serde_json::Value) -> Result<()>;
}
