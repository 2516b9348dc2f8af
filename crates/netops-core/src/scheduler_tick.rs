//! Scheduler Tick (spec §4.9, C9): a fixed-cadence loop that dispatches
//! due jobs onto the broker, advances `next_run_at`, and reaps stale
//! executions. Grounded on `ob-workflow::listener::TaskQueueListener::run`
//! for the `watch`-driven shutdown loop, generalized from "drain one queue
//! row" to "drain one due-jobs batch per tick".

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::watch;
use uuid::Uuid;

use crate::model::job::{Execution, ExecutionStatus};
use crate::model::scheduler::{ScheduleType, SchedulerJob};
use crate::model::value::Value;
use crate::ports::broker::BrokerPort;
use crate::ports::persistence::PersistencePort;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_STALE_THRESHOLD: chrono::Duration = chrono::Duration::seconds(600);

#[derive(Debug, Default, Clone)]
pub struct TickResult {
    pub enqueued: Vec<String>,
    pub timed_out: Vec<TimedOutExecution>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TimedOutExecution {
    pub task_id: String,
    pub job_name: String,
}

pub struct SchedulerTick<'a> {
    pub persistence: &'a dyn PersistencePort,
    pub broker: &'a dyn BrokerPort,
    pub stale_threshold: chrono::Duration,
}

impl<'a> SchedulerTick<'a> {
    pub fn new(persistence: &'a dyn PersistencePort, broker: &'a dyn BrokerPort) -> Self {
        Self { persistence, broker, stale_threshold: DEFAULT_STALE_THRESHOLD }
    }

    /// Run the tick loop at `interval` until `shutdown` fires (spec §4.9
    /// "fixed cadence Δ"). Mirrors the listener's select-on-sleep-or-signal
    /// shape rather than `tokio::time::interval`, so a tick never overlaps
    /// the next while `tick_once` is still running.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("scheduler tick loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let result = self.tick_once().await;
            tracing::info!(
                enqueued = result.enqueued.len(),
                timed_out = result.timed_out.len(),
                "scheduler tick completed"
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("scheduler tick loop shutting down");
    }

    /// One tick (spec §4.9 steps 1-5): polls due jobs, dispatches them,
    /// reaps stale executions.
    pub async fn tick_once(&self) -> TickResult {
        let now = Utc::now();
        let due = match self.persistence.get_due_jobs(now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "failed to load due jobs");
                return TickResult { timestamp: Some(now), ..Default::default() };
            }
        };

        let mut enqueued = Vec::new();
        for job in &due {
            self.dispatch_one(job, now, &mut enqueued).await;
        }

        let timed_out = match self.persistence.reap_stale_executions(self.stale_threshold).await {
            Ok(rows) => rows
                .into_iter()
                .map(|row| TimedOutExecution { task_id: row.task_id, job_name: row.job_name })
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "failed to reap stale executions");
                Vec::new()
            }
        };

        TickResult { enqueued, timed_out, timestamp: Some(now) }
    }

    async fn dispatch_one(&self, job: &SchedulerJob, now: DateTime<Utc>, enqueued: &mut Vec<String>) {
        let task_id = match self.broker.send_task(&job.task_name, job.config.clone()).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(job = %job.name, error = %e, "enqueue failed, will retry next tick");
                let task_id = Uuid::new_v4().to_string();
                let row = Execution {
                    task_id: task_id.clone(),
                    job_name: job.name.clone(),
                    task_name: job.task_name.clone(),
                    status: ExecutionStatus::Failed,
                    started_at: now,
                    finished_at: Some(now),
                    error_message: Some(e.to_string()),
                    result: Value::Null,
                };
                if let Err(e) = self.persistence.create_execution(row).await {
                    tracing::error!(job = %job.name, error = %e, "failed to record enqueue-failure execution");
                }
                return;
            }
        };

        let next_run_at = compute_next_run_at(job, now);
        if let Err(e) = self.persistence.mark_scheduler_job_run(&job.name, now, next_run_at).await {
            tracing::error!(job = %job.name, error = %e, "failed to advance scheduler job run");
        }

        let row = Execution {
            task_id: task_id.clone(),
            job_name: job.name.clone(),
            task_name: job.task_name.clone(),
            status: ExecutionStatus::Queued,
            started_at: now,
            finished_at: None,
            error_message: None,
            result: {
                let mut m = BTreeMap::new();
                m.insert("config".to_string(), Value::from(job.config.clone()));
                Value::Map(m)
            },
        };
        if let Err(e) = self.persistence.create_execution(row).await {
            tracing::error!(job = %job.name, error = %e, "failed to record queued execution");
        }

        enqueued.push(job.name.clone());
    }
}

/// Next `next_run_at` (spec §4.9 step 3): `now + interval_seconds` for
/// interval jobs; next cron match strictly after `now` for cron jobs;
/// malformed cron expressions leave `null`.
fn compute_next_run_at(job: &SchedulerJob, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match job.schedule_type {
        ScheduleType::Interval => {
            let seconds = job.interval_seconds.unwrap_or(0).max(0);
            Some(now + chrono::Duration::seconds(seconds))
        }
        ScheduleType::Cron => {
            let expr = job.cron_expression.as_deref()?;
            Schedule::from_str(expr).ok()?.after(&now).next()
        }
    }
}

/// The default tick cadence (spec §4.9: "fixed cadence Δ (default 30 s)").
pub fn default_interval() -> Duration {
    DEFAULT_TICK_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scheduler::{SchedulerJobFilter, SchedulerJobSpec};
    use crate::testkit::{FakeBroker, FakePersistence};

    async fn seed_interval_job(persistence: &FakePersistence, name: &str) {
        persistence
            .upsert_scheduler_job(SchedulerJobSpec {
                name: name.to_string(),
                task_name: "run_job".to_string(),
                config: serde_json::json!({"job_id": name}),
                enabled: true,
                schedule_type: ScheduleType::Interval,
                interval_seconds: Some(3600),
                cron_expression: None,
                start_at: None,
                end_at: None,
                max_runs: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn due_job_is_enqueued_and_next_run_at_advances() {
        let persistence = FakePersistence::default();
        seed_interval_job(&persistence, "ping-sweep").await;
        let broker = FakeBroker::default();
        let tick = SchedulerTick::new(&persistence, &broker);

        let result = tick.tick_once().await;
        assert_eq!(result.enqueued, vec!["ping-sweep".to_string()]);

        let jobs = persistence.list_scheduler_jobs(&SchedulerJobFilter::default()).await.unwrap();
        let job = jobs.iter().find(|j| j.name == "ping-sweep").unwrap();
        assert_eq!(job.run_count, 1);
        assert!(job.next_run_at.unwrap() > Utc::now());

        // Not due again immediately after advancing.
        let second = tick.tick_once().await;
        assert!(second.enqueued.is_empty());
    }

    #[tokio::test]
    async fn enqueue_failure_does_not_advance_next_run_at() {
        let persistence = FakePersistence::default();
        seed_interval_job(&persistence, "flaky-job").await;
        let broker = FakeBroker::default();
        broker.fail_next_send().await;
        let tick = SchedulerTick::new(&persistence, &broker);

        let result = tick.tick_once().await;
        assert!(result.enqueued.is_empty());

        let jobs = persistence.list_scheduler_jobs(&SchedulerJobFilter::default()).await.unwrap();
        let job = jobs.iter().find(|j| j.name == "flaky-job").unwrap();
        assert_eq!(job.run_count, 0);
        assert!(job.next_run_at.is_none());
    }

    #[test]
    fn malformed_cron_leaves_next_run_at_null() {
        let job = SchedulerJob {
            name: "bad-cron".into(),
            task_name: "run_job".into(),
            config: serde_json::json!({}),
            enabled: true,
            schedule_type: ScheduleType::Cron,
            interval_seconds: None,
            cron_expression: Some("not a cron expression".to_string()),
            start_at: None,
            end_at: None,
            max_runs: None,
            run_count: 0,
            last_run_at: None,
            next_run_at: None,
        };
        assert_eq!(compute_next_run_at(&job, Utc::now()), None);
    }

    #[test]
    fn valid_cron_computes_next_instant_strictly_after_now() {
        let now = Utc::now();
        let job = SchedulerJob {
            name: "nightly".into(),
            task_name: "run_job".into(),
            config: serde_json::json!({}),
            enabled: true,
            schedule_type: ScheduleType::Cron,
            interval_seconds: None,
            cron_expression: Some("0 0 0 * * *".to_string()),
            start_at: None,
            end_at: None,
            max_runs: None,
            run_count: 0,
            last_run_at: None,
            next_run_at: None,
        };
        let next = compute_next_run_at(&job, now).unwrap();
        assert!(next > now);
    }
}
