//! JobDefinition, Action, Execution, and ExecutionContext (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::targeting::Targeting;
use super::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub login_method: LoginMethod,
    pub targeting: Targeting,
    pub execution: ExecutionSpec,
    #[serde(default)]
    pub result_parsing: BTreeMap<String, Parser>,
    #[serde(default)]
    pub database: Vec<SinkSpec>,
    #[serde(default)]
    pub notifications: Notifications,
    /// Outbound edges for explicit DAG ordering; empty means
    /// "definition order is the total order" (spec §4.8 step 2).
    #[serde(default)]
    pub edges: Vec<DagEdge>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Ping,
    SnmpScan,
    SshScan,
    RdpScan,
    Autodiscovery,
    LogicIf,
    LogicSwitch,
    LogicLoop,
    Custom(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagEdge {
    pub to: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoginMethod {
    Ping {
        #[serde(default = "default_ping_count")]
        count: u32,
        #[serde(default = "default_ping_timeout_ms")]
        timeout_ms: u64,
    },
    Snmp {
        community: String,
        #[serde(default = "default_snmp_port")]
        port: u16,
    },
    SshPort {
        #[serde(default = "default_ssh_port")]
        port: u16,
    },
    SshCli {
        username: String,
        #[serde(default)]
        password: Option<String>,
        #[serde(default = "default_ssh_port")]
        port: u16,
    },
    RdpPort {
        #[serde(default = "default_rdp_port")]
        port: u16,
    },
}

fn default_ping_count() -> u32 {
    2
}
fn default_ping_timeout_ms() -> u64 {
    1000
}
fn default_snmp_port() -> u16 {
    161
}
fn default_ssh_port() -> u16 {
    22
}
fn default_rdp_port() -> u16 {
    3389
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionSpec {
    #[serde(default)]
    pub command: Option<CommandSpec>,
    #[serde(default)]
    pub commands: Vec<CommandStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub template: String,
    #[serde(default = "default_command_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub parser_ref: Option<String>,
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStep {
    pub id: String,
    pub template: String,
    #[serde(default)]
    pub parser_ref: Option<String>,
    #[serde(default)]
    pub foreach: Option<String>,
    #[serde(default)]
    pub filter: BTreeMap<String, Value>,
    #[serde(default)]
    pub store_as: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parser {
    Builtin { name: String },
    Regex { patterns: Vec<String> },
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SinkOperation {
    Insert,
    Upsert,
    UpdateLldp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSpec {
    pub table: String,
    pub source_key: String,
    pub operation: SinkOperation,
    #[serde(default)]
    pub filter: Option<SinkFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkFilter {
    FieldEquals { field: String, value: Value },
    HasPowerReading,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Notifications {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub on_success: bool,
    #[serde(default)]
    pub on_failure: bool,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// A notification event emitted by the Job Engine (spec §4.8 step 7).
/// Delivery is a sink the core does not implement (spec §1 Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Success,
    Failed,
    Timeout,
}

/// One historical run of a scheduled job (spec §3 "Execution").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub task_id: String,
    pub job_name: String,
    pub task_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Value,
}

/// Per-run in-memory state threaded through an action (spec §3
/// "ExecutionContext").
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub variables: BTreeMap<String, Value>,
    pub node_results: BTreeMap<String, NodeResult>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: ActionStatus,
    pub output_data: Value,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failure,
    Cancelled,
}

impl ExecutionContext {
    pub fn new(trigger: Value) -> Self {
        let mut variables = BTreeMap::new();
        variables.insert("trigger".to_string(), trigger);
        Self {
            variables,
            node_results: BTreeMap::new(),
            cancelled: false,
        }
    }

    /// Publish an action's output into `variables` under id, label, and
    /// the `results` alias (spec §4.8 step 5).
    pub fn publish_output(&mut self, action_id: &str, label: Option<&str>, output: Value) {
        self.variables.insert(action_id.to_string(), output.clone());
        if let Some(label) = label {
            self.variables.insert(label.to_string(), output.clone());
        }
        self.variables.insert("results".to_string(), output);
    }

    /// `PreviousResult(field)` read (spec §4.5): missing field is empty,
    /// never an error.
    pub fn previous_result_field(&self, field: &str) -> Vec<String> {
        self.variables
            .get("results")
            .and_then(|v| v.get(field))
            .and_then(|v| v.as_list())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `RunResult` returned by the Job Engine entry point (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: ActionStatus,
    pub actions: Vec<ActionSummary>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSummary {
    pub action_id: String,
    pub status: ActionStatus,
    pub output_data: Value,
    pub error: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub output_data: Value,
    pub error: Option<String>,
}
