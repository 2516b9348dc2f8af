//! Action Executor (spec §4.7, C7): runs one `Action` against one target —
//! login, command(s), parse, sink-write. Grounded on
//! `generic_job_scheduler.py::_execute_multi_command_action`'s target
//! context (`interfaces`, `port_status`, `lldp_neighbors`) and merge rules.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;

use crate::model::discovery::InterfaceFact;
use crate::model::job::{
    Action, ActionResult, ActionStatus, CommandStep, ExecutionContext, LoginMethod, SinkFilter,
    SinkOperation, SinkSpec,
};
use crate::model::value::Value;
use crate::parsers::{self, RawOutput};
use crate::ports::inventory::InventoryPort;
use crate::ports::probe::ProbeAdapter;
use crate::resolver::variable;

/// Per-target scratch state threaded through multi-command execution
/// (spec §3 "target_context").
#[derive(Debug, Clone, Default)]
pub struct TargetContext {
    pub ip: String,
    pub parsed_data: BTreeMap<String, Value>,
    pub interfaces: Vec<InterfaceFact>,
    pub port_status: BTreeMap<u32, Value>,
    pub lldp_neighbors: BTreeMap<u32, Value>,
    pub stores: BTreeMap<String, Vec<Value>>,
}

/// A sink write recorded for later application by the caller (the
/// Persistence/Inventory Port is outside this crate's concern per spec
/// §1; the executor produces the writes, the caller applies them).
#[derive(Debug, Clone)]
pub struct SinkWrite {
    pub table: String,
    pub operation: SinkOperation,
    pub rows: Vec<Value>,
}

pub struct ActionExecutor<'a> {
    pub probe: &'a dyn ProbeAdapter,
    #[allow(dead_code)]
    pub inventory: &'a dyn InventoryPort,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(probe: &'a dyn ProbeAdapter, inventory: &'a dyn InventoryPort) -> Self {
        Self { probe, inventory }
    }

    /// Execute `action` against `ip`, returning the result plus any sink
    /// writes it produced (spec §4.7 flow, steps 1-6).
    pub async fn execute(
        &self,
        action: &Action,
        ip: IpAddr,
        ctx: &ExecutionContext,
    ) -> (ActionResult, Vec<SinkWrite>) {
        let mut target = TargetContext {
            ip: ip.to_string(),
            ..Default::default()
        };

        let result = if !action.execution.commands.is_empty() {
            self.run_multi_command(action, ip, ctx, &mut target).await
        } else if let Some(cmd) = &action.execution.command {
            let template = variable::resolve(&Value::String(cmd.template.clone()), ctx)
                .stringify();
            let timeout = Duration::from_millis(cmd.timeout_ms);
            let raw = self.run_command(action, ip, &template, timeout).await;
            let parsed = cmd
                .parser_ref
                .as_ref()
                .and_then(|name| action.result_parsing.get(name))
                .map(|p| parsers::apply(p, &raw))
                .unwrap_or(Value::Map(BTreeMap::new()));
            target.parsed_data.insert("result".to_string(), parsed.clone());
            Ok(parsed)
        } else {
            // No executor configured for this action type: no-op success
            // for forward compatibility (spec §4.7 edge cases).
            Ok(Value::Map(BTreeMap::new()))
        };

        self.merge_port_status_into_interfaces(&mut target);
        self.merge_lldp_into_interfaces(&mut target);

        let action_result = match result {
            Ok(output) if is_failure_output(&output) => ActionResult {
                status: ActionStatus::Failure,
                error: extract_error(&output),
                output_data: output,
            },
            Ok(output) => ActionResult {
                status: ActionStatus::Success,
                output_data: output,
                error: None,
            },
            Err(e) => ActionResult {
                status: ActionStatus::Failure,
                output_data: Value::Map(BTreeMap::new()),
                error: Some(e),
            },
        };

        let writes = self.build_sink_writes(action, &target);
        (action_result, writes)
    }

    async fn run_multi_command(
        &self,
        action: &Action,
        ip: IpAddr,
        ctx: &ExecutionContext,
        target: &mut TargetContext,
    ) -> Result<Value, String> {
        for step in &action.execution.commands {
            if let Some(foreach_key) = &step.foreach {
                self.run_foreach_step(action, ip, ctx, target, step, foreach_key)
                    .await?;
            } else {
                let template = variable::resolve(&Value::String(step.template.clone()), ctx)
                    .stringify();
                let raw = self
                    .run_command(action, ip, &template, Duration::from_secs(30))
                    .await;
                let parsed = step
                    .parser_ref
                    .as_ref()
                    .and_then(|name| action.result_parsing.get(name))
                    .map(|p| parsers::apply(p, &raw))
                    .unwrap_or(Value::Map(BTreeMap::new()));

                if let Some(store_as) = &step.store_as {
                    let items = parsed.as_list().map(|l| l.to_vec()).unwrap_or_else(|| vec![parsed.clone()]);
                    target.stores.insert(store_as.clone(), items);
                }
                target.parsed_data.insert(step.id.clone(), parsed);
            }
        }
        Ok(Value::Map(target.parsed_data.clone()))
    }

    async fn run_foreach_step(
        &self,
        action: &Action,
        ip: IpAddr,
        ctx: &ExecutionContext,
        target: &mut TargetContext,
        step: &CommandStep,
        foreach_key: &str,
    ) -> Result<(), String> {
        let items = target.stores.get(foreach_key).cloned().unwrap_or_default();
        for item in items {
            if !passes_filter(&item, &step.filter) {
                continue;
            }
            let item_ctx = templated_with_item(ctx, &item);
            let template = variable::resolve(&Value::String(step.template.clone()), &item_ctx)
                .stringify();
            let raw = self
                .run_command(action, ip, &template, Duration::from_secs(30))
                .await;
            let parsed = step
                .parser_ref
                .as_ref()
                .and_then(|name| action.result_parsing.get(name))
                .map(|p| parsers::apply(p, &raw))
                .unwrap_or(Value::Map(BTreeMap::new()));

            // Merge into the iterated item (spec §4.7 step 4).
            let merged = merge_maps(&item, &parsed);

            match foreach_key {
                "port_status" => {
                    if let Some(port) = port_number_of(&merged) {
                        target.port_status.insert(port, merged);
                    }
                }
                "lldp_neighbors" => {
                    if let Some(port) = port_number_of(&merged) {
                        target.lldp_neighbors.insert(port, merged);
                    }
                }
                _ => {
                    target
                        .stores
                        .entry(foreach_key.to_string())
                        .or_default()
                        .push(merged);
                }
            }
        }
        Ok(())
    }

    async fn run_command(
        &self,
        action: &Action,
        ip: IpAddr,
        command: &str,
        timeout: Duration,
    ) -> RawOutput {
        match &action.login_method {
            LoginMethod::Ping { count, timeout_ms } => {
                let outcome = self
                    .probe
                    .ping(ip, *count, Duration::from_millis(*timeout_ms))
                    .await
                    .unwrap_or_default();
                RawOutput {
                    reachable: Some(outcome.reachable),
                    rtt_ms: outcome.rtt_ms,
                    ..Default::default()
                }
            }
            LoginMethod::Snmp { community, .. } => {
                let value = self
                    .probe
                    .snmp_get(ip, community, command, timeout)
                    .await
                    .ok()
                    .flatten();
                RawOutput {
                    snmp_value: value.clone(),
                    text: value.unwrap_or_default(),
                    ..Default::default()
                }
            }
            LoginMethod::SshPort { port } => {
                let open = self
                    .probe
                    .tcp_probe(ip, *port, timeout)
                    .await
                    .map(|o| o.open)
                    .unwrap_or(false);
                RawOutput { port_open: Some(open), ..Default::default() }
            }
            LoginMethod::SshCli { username, password, port } => {
                let output = self
                    .probe
                    .ssh_exec(ip, username, password.as_deref(), *port, command, timeout)
                    .await
                    .map(|o| o.output)
                    .unwrap_or_default();
                RawOutput { text: output, ..Default::default() }
            }
            LoginMethod::RdpPort { port } => {
                let open = self
                    .probe
                    .tcp_probe(ip, *port, timeout)
                    .await
                    .map(|o| o.open)
                    .unwrap_or(false);
                RawOutput { port_open: Some(open), ..Default::default() }
            }
        }
    }

    /// `port_status` merge precedence (spec §4.7 step 5): oper link ->
    /// `status`; mode -> `speed` if empty; port_type -> `medium` if empty;
    /// electrical types imply RJ45.
    fn merge_port_status_into_interfaces(&self, target: &mut TargetContext) {
        for (port, status) in &target.port_status {
            let iface = find_or_create_interface(&mut target.interfaces, *port);
            if let Some(oper) = status.get("oper").and_then(|v| v.as_str()) {
                iface.status = Some(oper.to_string());
            }
            if iface.speed.is_none() {
                if let Some(mode) = status.get("mode").and_then(|v| v.as_str()) {
                    iface.speed = Some(mode.to_string());
                }
            }
            if iface.medium.is_none() {
                if let Some(port_type) = status.get("port_type").and_then(|v| v.as_str()) {
                    iface.medium = Some(if is_electrical(port_type) {
                        "RJ45".to_string()
                    } else {
                        port_type.to_string()
                    });
                }
            }
        }
    }

    /// Presence of a live LLDP neighbor promotes an interface to
    /// `status='up'` (spec §4.7 step 5).
    fn merge_lldp_into_interfaces(&self, target: &mut TargetContext) {
        for (port, neighbor) in &target.lldp_neighbors {
            let iface = find_or_create_interface(&mut target.interfaces, *port);
            iface.lldp_neighbor = neighbor
                .get("neighbor")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| Some(neighbor.stringify()));
            iface.status = Some("up".to_string());
        }
    }

    fn build_sink_writes(&self, action: &Action, target: &TargetContext) -> Vec<SinkWrite> {
        action
            .database
            .iter()
            .filter_map(|sink| self.build_one_sink(sink, target))
            .collect()
    }

    fn build_one_sink(&self, sink: &SinkSpec, target: &TargetContext) -> Option<SinkWrite> {
        let source = source_value(sink, target)?;
        let rows: Vec<Value> = match &source {
            Value::List(items) => items
                .iter()
                .filter(|item| passes_sink_filter(item, &sink.filter))
                .cloned()
                .collect(),
            other => {
                if passes_sink_filter(other, &sink.filter) {
                    vec![other.clone()]
                } else {
                    Vec::new()
                }
            }
        };
        if rows.is_empty() {
            return None;
        }
        Some(SinkWrite {
            table: sink.table.clone(),
            operation: sink.operation.clone(),
            rows,
        })
    }
}

fn source_value(sink: &SinkSpec, target: &TargetContext) -> Option<Value> {
    match sink.source_key.as_str() {
        "interfaces" => Some(Value::List(
            target
                .interfaces
                .iter()
                .map(|i| {
                    let mut m = BTreeMap::new();
                    m.insert("port".to_string(), Value::Int(i.port as i64));
                    if let Some(s) = &i.status {
                        m.insert("status".to_string(), Value::String(s.clone()));
                    }
                    if let Some(s) = &i.speed {
                        m.insert("speed".to_string(), Value::String(s.clone()));
                    }
                    if let Some(m2) = &i.medium {
                        m.insert("medium".to_string(), Value::String(m2.clone()));
                    }
                    Value::Map(m)
                })
                .collect(),
        )),
        key => target
            .stores
            .get(key)
            .map(|items| Value::List(items.clone()))
            .or_else(|| target.parsed_data.get(key).cloned()),
    }
}

fn passes_sink_filter(item: &Value, filter: &Option<SinkFilter>) -> bool {
    match filter {
        None => true,
        Some(SinkFilter::FieldEquals { field, value }) => item.get(field) == Some(value),
        Some(SinkFilter::HasPowerReading) => {
            ["tx", "rx", "temperature"]
                .iter()
                .any(|f| item.get(f).map(|v| !v.is_null()).unwrap_or(false))
        }
    }
}

fn passes_filter(item: &Value, filter: &BTreeMap<String, Value>) -> bool {
    filter.iter().all(|(k, v)| item.get(k) == Some(v))
}

fn merge_maps(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Map(b), Value::Map(o)) => {
            let mut merged = b.clone();
            for (k, v) in o {
                merged.insert(k.clone(), v.clone());
            }
            Value::Map(merged)
        }
        _ => overlay.clone(),
    }
}

fn port_number_of(item: &Value) -> Option<u32> {
    match item.get("port").or_else(|| item.get("cli_port")) {
        Some(Value::Int(i)) => Some(*i as u32),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn find_or_create_interface(interfaces: &mut Vec<InterfaceFact>, port: u32) -> &mut InterfaceFact {
    if let Some(idx) = interfaces.iter().position(|i| i.port == port) {
        return &mut interfaces[idx];
    }
    interfaces.push(InterfaceFact { port, ..Default::default() });
    interfaces.last_mut().unwrap()
}

fn is_electrical(port_type: &str) -> bool {
    matches!(port_type.to_lowercase().as_str(), "electrical" | "copper" | "rj45")
}

fn templated_with_item(ctx: &ExecutionContext, item: &Value) -> ExecutionContext {
    let mut new_ctx = ctx.clone();
    if let Value::Map(fields) = item {
        for (k, v) in fields {
            new_ctx.variables.insert(k.clone(), v.clone());
        }
    }
    new_ctx
}

/// Action fails when output contains `success=false` or a non-empty
/// `error`/`errors` (spec §4.7 error semantics).
fn is_failure_output(output: &Value) -> bool {
    if let Some(Value::Bool(false)) = output.get("success") {
        return true;
    }
    if matches!(output.get("error"), Some(v) if !v.is_null()) {
        return true;
    }
    matches!(output.get("errors"), Some(Value::List(l)) if !l.is_empty())
}

fn extract_error(output: &Value) -> Option<String> {
    output
        .get("error")
        .and_then(|v| v.as_str().map(str::to_string))
        .or_else(|| output.get("errors").map(|v| v.stringify()))
}

#[allow(dead_code)]
fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_detection_on_success_false() {
        let mut m = BTreeMap::new();
        m.insert("success".to_string(), Value::Bool(false));
        assert!(is_failure_output(&Value::Map(m)));
    }

    #[test]
    fn failure_detection_on_nonempty_errors() {
        let mut m = BTreeMap::new();
        m.insert("errors".to_string(), Value::List(vec![Value::String("x".into())]));
        assert!(is_failure_output(&Value::Map(m)));
    }

    #[test]
    fn success_output_is_not_failure() {
        let mut m = BTreeMap::new();
        m.insert("errors".to_string(), Value::List(vec![]));
        assert!(!is_failure_output(&Value::Map(m)));
    }

    #[test]
    fn electrical_port_type_implies_rj45() {
        assert!(is_electrical("Electrical"));
        assert!(!is_electrical("Fiber"));
    }
}
