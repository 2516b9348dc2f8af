//! Job Engine (spec §4.8, C8): `run(job_def, trigger_data) -> RunResult`.
//!
//! Grounded on `ob-workflow::engine::WorkflowEngine`'s transition-following
//! shape, generalized from a state machine to a DAG of actions. Audit
//! events are `tracing` spans, same idiom as `ob-workflow::listener`; a
//! write failure there has nothing to roll back, so it is a log line, not
//! a port call.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};

use crate::executor::ActionExecutor;
use crate::model::job::{
    Action, ActionKind, ActionStatus, ActionSummary, ExecutionContext, JobDefinition,
    NotificationEvent, RunResult,
};
use crate::model::value::Value;
use crate::ports::broker::{BrokerPort, TaskState};
use crate::ports::inventory::InventoryPort;
use crate::ports::probe::ProbeAdapter;
use crate::resolver::target;

const CHORD_TIMEOUT: Duration = Duration::from_secs(600);
const CHORD_POLL_INTERVAL: Duration = Duration::from_secs(2);

enum ChordOutcome {
    Completed(Value),
    Failed(String),
    TimedOut,
}

pub struct JobEngine<'a> {
    pub probe: &'a dyn ProbeAdapter,
    pub inventory: &'a dyn InventoryPort,
    pub broker: &'a dyn BrokerPort,
}

impl<'a> JobEngine<'a> {
    pub fn new(probe: &'a dyn ProbeAdapter, inventory: &'a dyn InventoryPort, broker: &'a dyn BrokerPort) -> Self {
        Self { probe, inventory, broker }
    }

    pub async fn run(&self, job_def: &JobDefinition, trigger_data: Value) -> RunResult {
        tracing::info!(job = %job_def.name, "job_started");

        let mut ctx = ExecutionContext::new(trigger_data);
        let mut summaries = Vec::new();
        let mut errors = Vec::new();

        let by_id: BTreeMap<&str, &Action> = job_def.actions.iter().map(|a| (a.id.as_str(), a)).collect();
        let mut incoming: BTreeMap<&str, usize> = job_def.actions.iter().map(|a| (a.id.as_str(), 0)).collect();
        for action in &job_def.actions {
            for edge in &action.edges {
                *incoming.entry(edge.to.as_str()).or_insert(0) += 1;
            }
        }

        // Roots are actions nothing points to; explicit DAG edges, when
        // present, override declaration order from there on (spec §4.8
        // step 2-3).
        let mut queue: VecDeque<&Action> = job_def
            .actions
            .iter()
            .filter(|a| a.enabled && incoming.get(a.id.as_str()).copied().unwrap_or(0) == 0)
            .collect();
        let mut executed: BTreeSet<&str> = BTreeSet::new();

        while let Some(action) = queue.pop_front() {
            if !action.enabled || executed.contains(action.id.as_str()) {
                continue;
            }
            executed.insert(action.id.as_str());

            tracing::info!(job = %job_def.name, action = %action.id, "action_started");
            let started = Instant::now();
            let started_at = Utc::now();

            let (summary, handle) = self.run_one_action(action, &mut ctx).await;

            let duration_ms = started.elapsed().as_millis() as i64;
            tracing::info!(
                job = %job_def.name,
                action = %action.id,
                status = ?summary.status,
                duration_ms,
                "action_completed"
            );
            let _ = started_at;

            if let Some(err) = &summary.error {
                errors.push(format!("{}: {err}", action.id));
            }

            self.maybe_notify(action, &summary);

            // Only edges whose label matches the observed outcome handle
            // are followed (spec §4.8 step 3) — the untaken branch of an
            // `if`/`switch`/`loop` never runs.
            for edge in &action.edges {
                if edge.label == handle {
                    if let Some(target) = by_id.get(edge.to.as_str()) {
                        if target.enabled && !executed.contains(target.id.as_str()) {
                            queue.push_back(target);
                        }
                    }
                }
            }

            summaries.push(summary);
        }

        let status = if summaries.iter().any(|s| s.status == ActionStatus::Failure) {
            ActionStatus::Failure
        } else {
            ActionStatus::Success
        };

        tracing::info!(job = %job_def.name, ?status, "job_completed");

        RunResult { status, actions: summaries, errors }
    }

    async fn run_one_action(&self, action: &Action, ctx: &mut ExecutionContext) -> (ActionSummary, String) {
        let started = Instant::now();

        let targets = target::resolve(&action.targeting, ctx, self.inventory).await;
        let output = self.execute_over_targets(action, &targets, ctx).await;

        let handle = outcome_handle(action, &output);
        ctx.publish_output(&action.id, action.label.as_deref(), annotate_handle(&output, &handle));

        let duration_ms = started.elapsed().as_millis() as i64;
        let status = if handle == "failure" {
            ActionStatus::Failure
        } else {
            ActionStatus::Success
        };
        let error = output
            .get("error")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                if status == ActionStatus::Failure {
                    output.get("errors").map(Value::stringify)
                } else {
                    None
                }
            });

        let summary = ActionSummary {
            action_id: action.id.clone(),
            status,
            output_data: output,
            error,
            duration_ms,
        };
        (summary, handle)
    }

    /// Runs the action over every resolved IP and folds the per-target
    /// results into a single `output_data` (spec §4.7, §4.8 step 6 for the
    /// chord/fan-out wait).
    async fn execute_over_targets(&self, action: &Action, targets: &[IpAddr], ctx: &ExecutionContext) -> Value {
        let executor = ActionExecutor::new(self.probe, self.inventory);

        let mut online = Vec::new();
        let mut offline = Vec::new();
        let mut per_target = BTreeMap::new();
        let mut any_failure = false;

        for ip in targets {
            let (result, _writes) = executor.execute(action, *ip, ctx).await;
            if result.status == ActionStatus::Failure {
                any_failure = true;
                offline.push(Value::String(ip.to_string()));
            } else {
                online.push(Value::String(ip.to_string()));
            }
            per_target.insert(ip.to_string(), result.output_data);
        }

        if matches!(action.action_type, ActionKind::Custom(_)) {
            // Fan-out actions wait on a reducer task via the broker (spec
            // §4.8 step 6); the reducer's task id is the action's own id
            // by convention for chord-style jobs.
            let mut m = BTreeMap::new();
            m.insert("online".to_string(), Value::List(online));
            m.insert("offline".to_string(), Value::List(offline));
            m.insert("data".to_string(), Value::Map(per_target));

            match self.await_chord(&action.id).await {
                ChordOutcome::Completed(aggregate) => {
                    m.insert("trigger".to_string(), Value::Bool(!any_failure));
                    m.insert("aggregate".to_string(), aggregate);
                    if any_failure {
                        m.insert("errors".to_string(), Value::List(vec![Value::String("one or more targets failed".into())]));
                    }
                }
                ChordOutcome::Failed(message) => {
                    m.insert("trigger".to_string(), Value::Bool(false));
                    m.insert("errors".to_string(), Value::List(vec![Value::String(format!("chord reducer {} failed: {message}", action.id))]));
                }
                ChordOutcome::TimedOut => {
                    // At least one fan-out shard never reported back to the
                    // reducer within the 600s ceiling (spec §4.8 step 6,
                    // invariant 9): the missing shard is recorded and the
                    // action is forced to failure rather than silently
                    // falling back to the per-target tally.
                    m.insert("trigger".to_string(), Value::Bool(false));
                    m.insert(
                        "errors".to_string(),
                        Value::List(vec![Value::String(format!(
                            "chord reducer {} timed out after {}s waiting for fan-out shards",
                            action.id,
                            CHORD_TIMEOUT.as_secs()
                        ))]),
                    );
                }
            }
            return Value::Map(m);
        }

        let mut m = BTreeMap::new();
        m.insert("trigger".to_string(), Value::Bool(!any_failure));
        m.insert("results".to_string(), Value::Map(per_target.clone()));
        m.insert("online".to_string(), Value::List(online));
        m.insert("offline".to_string(), Value::List(offline));
        m.insert("data".to_string(), Value::Map(per_target));
        if any_failure {
            m.insert("errors".to_string(), Value::List(vec![Value::String("one or more targets failed".into())]));
        }
        Value::Map(m)
    }

    /// Poll the broker for a reducer task's result, bounded to 600s and
    /// polled every 2s (spec §4.8 step 6).
    async fn await_chord(&self, reducer_task_id: &str) -> ChordOutcome {
        let deadline = Instant::now() + CHORD_TIMEOUT;
        loop {
            match self.broker.inspect(reducer_task_id).await {
                Ok(inspection) if inspection.state == TaskState::Completed => {
                    return ChordOutcome::Completed(inspection.result.map(Value::from).unwrap_or(Value::Null));
                }
                Ok(inspection) if inspection.state == TaskState::Failed => {
                    return ChordOutcome::Failed(inspection.error.unwrap_or_else(|| "no error detail".to_string()));
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return ChordOutcome::TimedOut;
            }
            sleep(CHORD_POLL_INTERVAL).await;
        }
    }

    /// Notification delivery is out of scope (spec §1 Non-goals); the
    /// engine only decides whether to emit and swallows the decision's
    /// own failures, same as `_maybe_send_action_notification` in the
    /// original scheduler.
    fn maybe_notify(&self, action: &Action, summary: &ActionSummary) {
        if !action.notifications.enabled {
            return;
        }
        let successful = summary.status == ActionStatus::Success;
        if successful && !action.notifications.on_success {
            return;
        }
        if !successful && !action.notifications.on_failure {
            return;
        }
        let event = NotificationEvent {
            title: format!("{} {}", action.id, if successful { "succeeded" } else { "failed" }),
            body: summary.error.clone().unwrap_or_else(|| "completed".to_string()),
            tag: action.id.clone(),
            targets: action.notifications.targets.clone(),
        };
        tracing::debug!(action = %action.id, title = %event.title, "notification_emitted");
    }
}

/// Outcome handle for an action's `output_data` (spec §4.8 step 4).
fn outcome_handle(action: &Action, output: &Value) -> String {
    match &action.action_type {
        ActionKind::LogicIf => {
            if output.get("condition_result").and_then(Value::as_bool).unwrap_or(false) {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        ActionKind::LogicSwitch => output
            .get("matched_case")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| "default".to_string()),
        ActionKind::LogicLoop => {
            if output.get("done").and_then(Value::as_bool).unwrap_or(false) {
                "complete".to_string()
            } else {
                "each".to_string()
            }
        }
        _ => {
            if is_failure(output) {
                "failure".to_string()
            } else {
                "success".to_string()
            }
        }
    }
}

fn is_failure(output: &Value) -> bool {
    if let Some(Value::Bool(false)) = output.get("trigger") {
        return true;
    }
    matches!(output.get("errors"), Some(Value::List(l)) if !l.is_empty())
}

fn annotate_handle(output: &Value, handle: &str) -> Value {
    match output {
        Value::Map(m) => {
            let mut m = m.clone();
            m.insert("_handle".to_string(), Value::String(handle.to_string()));
            Value::Map(m)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::targeting::Targeting;
    use crate::model::job::{ActionKind, ExecutionSpec, LoginMethod, Notifications};
    use crate::testkit::{FakeBroker, FakeInventory, FakeProbe};

    fn ping_action(id: &str) -> Action {
        Action {
            id: id.to_string(),
            action_type: ActionKind::Ping,
            enabled: true,
            login_method: LoginMethod::Ping { count: 1, timeout_ms: 100 },
            targeting: Targeting::StaticList { ips: vec!["10.0.0.1".to_string()] },
            execution: ExecutionSpec::default(),
            result_parsing: BTreeMap::new(),
            database: Vec::new(),
            notifications: Notifications::default(),
            edges: Vec::new(),
            label: None,
        }
    }

    #[tokio::test]
    async fn run_reports_success_for_reachable_targets() {
        let probe = FakeProbe::all_reachable();
        let inventory = FakeInventory::default();
        let broker = FakeBroker::default();
        let engine = JobEngine::new(&probe, &inventory, &broker);

        let job = JobDefinition {
            id: "j1".into(),
            name: "ping sweep".into(),
            description: String::new(),
            enabled: true,
            actions: vec![ping_action("ping1")],
            config: BTreeMap::new(),
        };

        let result = engine.run(&job, Value::Null).await;
        assert_eq!(result.status, ActionStatus::Success);
        assert_eq!(result.actions.len(), 1);
    }

    #[tokio::test]
    async fn failure_in_any_action_fails_the_job() {
        let probe = FakeProbe::all_unreachable();
        probe.set_ssh_output("10.0.0.1".parse().unwrap(), r#"{"success": false, "error": "auth failed"}"#).await;
        let inventory = FakeInventory::default();
        let broker = FakeBroker::default();
        let engine = JobEngine::new(&probe, &inventory, &broker);

        let mut action = ping_action("ssh1");
        action.login_method = LoginMethod::SshCli { username: "admin".to_string(), password: None, port: 22 };
        action.execution.command = Some(crate::model::job::CommandSpec {
            template: "show version".to_string(),
            timeout_ms: 1000,
            parser_ref: Some("p".to_string()),
        });
        action.result_parsing.insert("p".to_string(), crate::model::job::Parser::Json);

        let job = JobDefinition {
            id: "j2".into(),
            name: "ssh job".into(),
            description: String::new(),
            enabled: true,
            actions: vec![action],
            config: BTreeMap::new(),
        };

        let result = engine.run(&job, Value::Null).await;
        assert_eq!(result.status, ActionStatus::Failure);
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn untaken_if_branch_never_executes() {
        let probe = FakeProbe::all_reachable();
        let inventory = FakeInventory::default();
        let broker = FakeBroker::default();
        let engine = JobEngine::new(&probe, &inventory, &broker);

        let mut gate = ping_action("gate");
        gate.action_type = ActionKind::LogicIf;
        gate.edges = vec![
            crate::model::job::DagEdge { to: "true_branch".to_string(), label: "true".to_string() },
            crate::model::job::DagEdge { to: "false_branch".to_string(), label: "false".to_string() },
        ];
        // `LogicIf`'s handle comes from `condition_result` in the action's
        // own output, which a bare ping never sets, so this gate always
        // resolves to the "false" handle.
        let true_branch = ping_action("true_branch");
        let false_branch = ping_action("false_branch");

        let job = JobDefinition {
            id: "j3".into(),
            name: "conditional".into(),
            description: String::new(),
            enabled: true,
            actions: vec![gate, true_branch, false_branch],
            config: BTreeMap::new(),
        };

        let result = engine.run(&job, Value::Null).await;
        let ran: Vec<&str> = result.actions.iter().map(|a| a.action_id.as_str()).collect();
        assert_eq!(ran, vec!["gate", "false_branch"]);
    }

    #[tokio::test(start_paused = true)]
    async fn chord_timeout_forces_action_failure() {
        let probe = FakeProbe::all_reachable();
        let inventory = FakeInventory::default();
        let broker = FakeBroker::default();
        let engine = JobEngine::new(&probe, &inventory, &broker);

        // The reducer task id equals the action's own id by convention; it
        // is never completed here, so the broker reports it `Pending`
        // forever and the chord wait must time out.
        let mut action = ping_action("fanout");
        action.action_type = ActionKind::Custom("fanout".to_string());

        let job = JobDefinition {
            id: "j4".into(),
            name: "fanout job".into(),
            description: String::new(),
            enabled: true,
            actions: vec![action],
            config: BTreeMap::new(),
        };

        let result = engine.run(&job, Value::Null).await;
        assert_eq!(result.status, ActionStatus::Failure);
        assert!(result.errors.iter().any(|e| e.contains("timed out")));
    }
}
