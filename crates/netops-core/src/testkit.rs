//! In-memory fakes for every port, used by this crate's own tests and
//! exported for downstream integration tests. Grounded on
//! `bpmn-lite-core::store_memory::MemoryStore`: a `RwLock`-guarded inner
//! struct behind a narrow trait impl, no mocking framework.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::job::{Execution, ExecutionStatus};
use crate::model::scheduler::{SchedulerJob, SchedulerJobFilter, SchedulerJobSpec};
use crate::ports::broker::{BrokerPort, TaskInspection, TaskState};
use crate::ports::inventory::{
    Device, DeviceLookup, DevicePatch, DeviceSpec, FindOrCreateEntity, Interface, InventoryPort,
    IpRecord,
};
use crate::ports::persistence::{ExecutionPatch, PersistencePort};
use crate::ports::probe::{PingOutcome, ProbeAdapter, SshOutput, TcpOutcome};

#[derive(Default)]
struct PersistenceInner {
    jobs: HashMap<String, SchedulerJob>,
    executions: HashMap<String, Execution>,
    definitions: HashMap<String, serde_json::Value>,
}

#[derive(Default)]
pub struct FakePersistence {
    inner: RwLock<PersistenceInner>,
}

#[async_trait]
impl PersistencePort for FakePersistence {
    async fn list_scheduler_jobs(&self, filter: &SchedulerJobFilter) -> Result<Vec<SchedulerJob>> {
        let r = self.inner.read().await;
        Ok(r.jobs
            .values()
            .filter(|j| filter.name.as_deref().map(|n| n == j.name).unwrap_or(true))
            .filter(|j| filter.enabled.map(|e| e == j.enabled).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<SchedulerJob>> {
        let r = self.inner.read().await;
        let mut due: Vec<SchedulerJob> = r.jobs.values().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by_key(|j| j.order_key());
        Ok(due)
    }

    async fn upsert_scheduler_job(&self, spec: SchedulerJobSpec) -> Result<SchedulerJob> {
        let mut w = self.inner.write().await;
        let job = w
            .jobs
            .get(&spec.name)
            .cloned()
            .map(|existing| SchedulerJob { run_count: existing.run_count, last_run_at: existing.last_run_at, next_run_at: existing.next_run_at, ..existing })
            .unwrap_or(SchedulerJob {
                name: spec.name.clone(),
                task_name: spec.task_name.clone(),
                config: spec.config.clone(),
                enabled: spec.enabled,
                schedule_type: spec.schedule_type,
                interval_seconds: spec.interval_seconds,
                cron_expression: spec.cron_expression.clone(),
                start_at: spec.start_at,
                end_at: spec.end_at,
                max_runs: spec.max_runs,
                run_count: 0,
                last_run_at: None,
                next_run_at: None,
            });
        w.jobs.insert(spec.name.clone(), job.clone());
        Ok(job)
    }

    async fn mark_scheduler_job_run(
        &self,
        name: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut w = self.inner.write().await;
        if let Some(job) = w.jobs.get_mut(name) {
            job.last_run_at = Some(last_run_at);
            job.next_run_at = next_run_at;
            job.run_count += 1;
        }
        Ok(())
    }

    async fn create_execution(&self, row: Execution) -> Result<()> {
        let mut w = self.inner.write().await;
        w.executions.insert(row.task_id.clone(), row);
        Ok(())
    }

    async fn update_execution(&self, task_id: &str, patch: ExecutionPatch) -> Result<()> {
        let mut w = self.inner.write().await;
        if let Some(row) = w.executions.get_mut(task_id) {
            if let Some(status) = patch.status {
                row.status = status;
            }
            if let Some(finished_at) = patch.finished_at {
                row.finished_at = Some(finished_at);
            }
            if let Some(message) = patch.error_message {
                row.error_message = Some(message);
            }
            if let Some(result) = patch.result {
                row.result = result.into();
            }
        }
        Ok(())
    }

    async fn reap_stale_executions(&self, threshold: chrono::Duration) -> Result<Vec<Execution>> {
        let mut w = self.inner.write().await;
        let now = Utc::now();
        let mut reaped = Vec::new();
        for row in w.executions.values_mut() {
            let stale = matches!(row.status, ExecutionStatus::Queued | ExecutionStatus::Running)
                && now - row.started_at > threshold;
            if stale {
                row.status = ExecutionStatus::Timeout;
                row.finished_at = Some(now);
                reaped.push(row.clone());
            }
        }
        Ok(reaped)
    }

    async fn get_job_definition(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let r = self.inner.read().await;
        Ok(r.definitions.get(id).cloned())
    }

    async fn upsert_job_definition(&self, id: &str, definition: serde_json::Value) -> Result<()> {
        let mut w = self.inner.write().await;
        w.definitions.insert(id.to_string(), definition);
        Ok(())
    }
}

#[derive(Default)]
struct BrokerInner {
    tasks: HashMap<String, TaskInspection>,
    sent: Vec<(String, serde_json::Value)>,
    next_failure: bool,
}

#[derive(Default)]
pub struct FakeBroker {
    inner: RwLock<BrokerInner>,
}

impl FakeBroker {
    /// Arranges for the next `send_task` to fail (exercises spec §4.9's
    /// enqueue-error path).
    pub async fn fail_next_send(&self) {
        self.inner.write().await.next_failure = true;
    }

    pub async fn complete(&self, task_id: &str, result: serde_json::Value) {
        self.inner.write().await.tasks.insert(
            task_id.to_string(),
            TaskInspection { state: TaskState::Completed, result: Some(result), error: None },
        );
    }

    pub async fn sent_tasks(&self) -> Vec<(String, serde_json::Value)> {
        self.inner.read().await.sent.clone()
    }
}

#[async_trait]
impl BrokerPort for FakeBroker {
    async fn send_task(&self, task_name: &str, args: serde_json::Value) -> Result<String> {
        let mut w = self.inner.write().await;
        if w.next_failure {
            w.next_failure = false;
            return Err(crate::error::NetopsError::Enqueue("broker unavailable".to_string()));
        }
        let task_id = format!("{task_name}-{}", w.sent.len());
        w.sent.push((task_name.to_string(), args));
        w.tasks.insert(task_id.clone(), TaskInspection { state: TaskState::Pending, result: None, error: None });
        Ok(task_id)
    }

    async fn inspect(&self, task_id: &str) -> Result<TaskInspection> {
        let r = self.inner.read().await;
        Ok(r.tasks.get(task_id).cloned().unwrap_or(TaskInspection {
            state: TaskState::Pending,
            result: None,
            error: None,
        }))
    }

    async fn cancel(&self, task_id: &str) -> Result<()> {
        let mut w = self.inner.write().await;
        w.tasks.remove(task_id);
        Ok(())
    }
}

#[derive(Default)]
struct InventoryInner {
    devices: HashMap<String, Device>,
    entities: HashMap<(FindOrCreateEntityKey, String), String>,
    interfaces: HashMap<(String, String), Interface>,
    ips: HashMap<String, IpRecord>,
    next_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FindOrCreateEntityKey {
    Manufacturer,
    DeviceType,
    DeviceRole,
    Tag,
}

impl From<FindOrCreateEntity> for FindOrCreateEntityKey {
    fn from(e: FindOrCreateEntity) -> Self {
        match e {
            FindOrCreateEntity::Manufacturer => Self::Manufacturer,
            FindOrCreateEntity::DeviceType => Self::DeviceType,
            FindOrCreateEntity::DeviceRole => Self::DeviceRole,
            FindOrCreateEntity::Tag => Self::Tag,
        }
    }
}

#[derive(Default)]
pub struct FakeInventory {
    inner: RwLock<InventoryInner>,
}

impl FakeInventory {
    async fn next_id(&self) -> String {
        let mut w = self.inner.write().await;
        w.next_id += 1;
        format!("id-{}", w.next_id)
    }

    pub async fn devices(&self) -> Vec<Device> {
        self.inner.read().await.devices.values().cloned().collect()
    }
}

#[async_trait]
impl InventoryPort for FakeInventory {
    async fn find_device(&self, lookup: DeviceLookup<'_>) -> Result<Option<Device>> {
        let r = self.inner.read().await;
        if let Some(ip) = lookup.ip {
            if let Some(ip_record) = r.ips.get(&ip.to_string()) {
                if let Some(device_id) = &ip_record.assigned_device_id {
                    return Ok(r.devices.get(device_id).cloned());
                }
            }
        }
        if let Some(name) = lookup.name {
            return Ok(r
                .devices
                .values()
                .find(|d| d.name.eq_ignore_ascii_case(name))
                .cloned());
        }
        if let Some(serial) = lookup.serial {
            return Ok(r.devices.values().find(|d| d.serial.as_deref() == Some(serial)).cloned());
        }
        Ok(None)
    }

    async fn create_device(&self, spec: DeviceSpec) -> Result<Device> {
        let id = self.next_id().await;
        let device = Device {
            id: id.clone(),
            name: spec.name,
            manufacturer: spec.manufacturer,
            device_type: spec.device_type,
            role: spec.role,
            serial: spec.serial,
            description: spec.description,
            tags: Vec::new(),
            primary_ipv4: None,
        };
        self.inner.write().await.devices.insert(id, device.clone());
        Ok(device)
    }

    async fn update_device(&self, id: &str, patch: DevicePatch) -> Result<Device> {
        let mut w = self.inner.write().await;
        let device = w
            .devices
            .get_mut(id)
            .ok_or_else(|| crate::error::NetopsError::NotFound { entity: "device", key: id.to_string() })?;
        if let Some(serial) = patch.serial {
            device.serial = Some(serial);
        }
        if let Some(description) = patch.description {
            device.description = Some(description);
        }
        Ok(device.clone())
    }

    async fn find_or_create(&self, entity: FindOrCreateEntity, key: &str) -> Result<String> {
        let mut w = self.inner.write().await;
        let entity_key = (entity.into(), key.to_string());
        if let Some(id) = w.entities.get(&entity_key) {
            return Ok(id.clone());
        }
        let id = {
            w.next_id += 1;
            format!("id-{}", w.next_id)
        };
        w.entities.insert(entity_key, id.clone());
        Ok(id)
    }

    async fn find_or_create_interface(&self, device_id: &str, name: &str) -> Result<Interface> {
        let mut w = self.inner.write().await;
        let key = (device_id.to_string(), name.to_string());
        if let Some(iface) = w.interfaces.get(&key) {
            return Ok(iface.clone());
        }
        w.next_id += 1;
        let iface = Interface { id: format!("id-{}", w.next_id), device_id: device_id.to_string(), name: name.to_string() };
        w.interfaces.insert(key, iface.clone());
        Ok(iface)
    }

    async fn find_or_create_ip(&self, address: &str) -> Result<IpRecord> {
        let mut w = self.inner.write().await;
        if let Some(ip) = w.ips.get(address) {
            return Ok(ip.clone());
        }
        w.next_id += 1;
        let ip = IpRecord { id: format!("id-{}", w.next_id), address: address.to_string(), assigned_device_id: None };
        w.ips.insert(address.to_string(), ip.clone());
        Ok(ip)
    }

    async fn assign_ip(&self, device_id: &str, _interface_id: &str, ip_id: &str) -> Result<()> {
        let mut w = self.inner.write().await;
        if let Some(ip) = w.ips.values_mut().find(|ip| ip.id == ip_id) {
            ip.assigned_device_id = Some(device_id.to_string());
        }
        Ok(())
    }

    async fn set_primary_ipv4(&self, device_id: &str, ip_id: &str) -> Result<()> {
        let mut w = self.inner.write().await;
        let address = w.ips.values().find(|ip| ip.id == ip_id).map(|ip| ip.address.clone());
        if let (Some(device), Some(address)) = (w.devices.get_mut(device_id), address) {
            device.primary_ipv4 = Some(address);
        }
        Ok(())
    }

    async fn resolve_prefix(&self, _prefix_id: &str) -> Result<Vec<IpAddr>> {
        Ok(Vec::new())
    }

    async fn resolve_ip_range(&self, _range_id: &str) -> Result<Vec<IpAddr>> {
        Ok(Vec::new())
    }
}

/// Scripted probe responses keyed by IP; unknown IPs default to
/// unreachable/closed/empty, never an error (spec §4.4).
#[derive(Default)]
pub struct FakeProbe {
    pub reachable: RwLock<HashSet<IpAddr>>,
    pub open_ports: RwLock<HashMap<IpAddr, HashSet<u16>>>,
    pub snmp: RwLock<HashMap<(IpAddr, String), String>>,
    pub ssh_output: RwLock<HashMap<IpAddr, String>>,
    pub dns_names: RwLock<HashMap<IpAddr, String>>,
    pub arp: RwLock<HashMap<IpAddr, String>>,
}

impl FakeProbe {
    pub fn all_reachable() -> Self {
        Self::default()
    }

    pub fn all_unreachable() -> Self {
        Self::default()
    }

    pub async fn set_reachable(&self, ip: IpAddr) {
        self.reachable.write().await.insert(ip);
    }

    pub async fn set_ssh_output(&self, ip: IpAddr, output: impl Into<String>) {
        self.ssh_output.write().await.insert(ip, output.into());
    }

    pub async fn set_snmp(&self, ip: IpAddr, oid: impl Into<String>, value: impl Into<String>) {
        self.snmp.write().await.insert((ip, oid.into()), value.into());
    }

    pub async fn set_open_port(&self, ip: IpAddr, port: u16) {
        self.open_ports.write().await.entry(ip).or_default().insert(port);
    }
}

#[async_trait]
impl ProbeAdapter for FakeProbe {
    async fn ping(&self, ip: IpAddr, _count: u32, _timeout: Duration) -> Result<PingOutcome> {
        let reachable = self.reachable.read().await.contains(&ip);
        Ok(PingOutcome { reachable, rtt_ms: reachable.then_some(1.0) })
    }

    async fn tcp_probe(&self, ip: IpAddr, port: u16, _timeout: Duration) -> Result<TcpOutcome> {
        let open = self.open_ports.read().await.get(&ip).map(|p| p.contains(&port)).unwrap_or(false);
        Ok(TcpOutcome { open })
    }

    async fn snmp_get(&self, ip: IpAddr, _community: &str, oid: &str, _timeout: Duration) -> Result<Option<String>> {
        Ok(self.snmp.read().await.get(&(ip, oid.to_string())).cloned())
    }

    async fn ssh_exec(
        &self,
        ip: IpAddr,
        _username: &str,
        _password: Option<&str>,
        _port: u16,
        _command: &str,
        _timeout: Duration,
    ) -> Result<SshOutput> {
        let output = self.ssh_output.read().await.get(&ip).cloned().unwrap_or_default();
        Ok(SshOutput { succeeded: !output.is_empty(), output })
    }

    async fn reverse_dns(&self, ip: IpAddr) -> Result<Option<String>> {
        Ok(self.dns_names.read().await.get(&ip).cloned())
    }

    async fn arp_lookup(&self, ip: IpAddr) -> Result<Option<String>> {
        Ok(self.arp.read().await.get(&ip).cloned())
    }
}
