//! SchedulerJob: persistent row binding a JobDefinition to a schedule
//! (spec §3 "SchedulerJob").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Interval,
    Cron,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerJob {
    pub name: String,
    pub task_name: String,
    pub config: serde_json::Value,
    pub enabled: bool,
    pub schedule_type: ScheduleType,
    pub interval_seconds: Option<i64>,
    pub cron_expression: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub max_runs: Option<i64>,
    pub run_count: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl SchedulerJob {
    /// Due-ness per the Persistence Port contract in spec §4.1.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(start) = self.start_at {
            if start > now {
                return false;
            }
        }
        if let Some(end) = self.end_at {
            if end < now {
                return false;
            }
        }
        if let Some(max_runs) = self.max_runs {
            if self.run_count >= max_runs {
                return false;
            }
        }
        match self.next_run_at {
            Some(next) => next <= now,
            None => true,
        }
    }

    /// Order key for `get_due_jobs`: `next_run_at ASC NULLS FIRST`.
    pub fn order_key(&self) -> (i64, DateTime<Utc>) {
        match self.next_run_at {
            Some(t) => (1, t),
            None => (0, DateTime::<Utc>::MIN_UTC),
        }
    }
}

/// Upsert spec for `upsert_scheduler_job` (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerJobSpec {
    pub name: String,
    pub task_name: String,
    pub config: serde_json::Value,
    pub enabled: bool,
    pub schedule_type: ScheduleType,
    pub interval_seconds: Option<i64>,
    pub cron_expression: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub max_runs: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerJobFilter {
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(now: DateTime<Utc>) -> SchedulerJob {
        SchedulerJob {
            name: "j".into(),
            task_name: "run_job".into(),
            config: serde_json::json!({}),
            enabled: true,
            schedule_type: ScheduleType::Interval,
            interval_seconds: Some(3600),
            cron_expression: None,
            start_at: None,
            end_at: None,
            max_runs: None,
            run_count: 0,
            last_run_at: None,
            next_run_at: Some(now),
        }
    }

    #[test]
    fn due_when_next_run_at_past() {
        let now = Utc::now();
        let mut j = base(now);
        j.next_run_at = Some(now - chrono::Duration::seconds(1));
        assert!(j.is_due(now));
    }

    #[test]
    fn not_due_when_run_count_reached_max() {
        let now = Utc::now();
        let mut j = base(now);
        j.max_runs = Some(1);
        j.run_count = 1;
        assert!(!j.is_due(now));
    }

    #[test]
    fn not_due_before_start_at() {
        let now = Utc::now();
        let mut j = base(now);
        j.start_at = Some(now + chrono::Duration::seconds(60));
        assert!(!j.is_due(now));
    }
}
