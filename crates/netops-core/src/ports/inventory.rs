//! Inventory Port (spec §4.3, C3).
//!
//! Resource-oriented CRUD with idempotent lookup. The pipeline relies on
//! `find_or_create` being serializable from the caller's perspective even
//! under concurrent invocation (spec §4.3) — same contract shape as
//! `bpmn-lite-core::store::ProcessStore`'s dedupe cache, applied to a
//! different resource set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub device_type: Option<String>,
    pub role: Option<String>,
    pub serial: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub primary_ipv4: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceLookup<'a> {
    pub name: Option<&'a str>,
    pub ip: Option<IpAddr>,
    pub mac: Option<&'a str>,
    pub serial: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    pub manufacturer: Option<String>,
    pub device_type: Option<String>,
    pub role: Option<String>,
    pub serial: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicePatch {
    pub serial: Option<String>,
    pub description: Option<String>,
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        self.serial.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub id: String,
    pub device_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRecord {
    pub id: String,
    pub address: String,
    pub assigned_device_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindOrCreateEntity {
    Manufacturer,
    DeviceType,
    DeviceRole,
    Tag,
}

#[async_trait]
pub trait InventoryPort: Send + Sync {
    async fn find_device(&self, lookup: DeviceLookup<'_>) -> Result<Option<Device>>;

    async fn create_device(&self, spec: DeviceSpec) -> Result<Device>;

    async fn update_device(&self, id: &str, patch: DevicePatch) -> Result<Device>;

    /// Idempotent find-or-create for manufacturers, device types, device
    /// roles, and tags (spec §4.3).
    async fn find_or_create(&self, entity: FindOrCreateEntity, key: &str) -> Result<String>;

    async fn find_or_create_interface(&self, device_id: &str, name: &str) -> Result<Interface>;

    async fn find_or_create_ip(&self, address: &str) -> Result<IpRecord>;

    async fn assign_ip(
        &self,
        device_id: &str,
        interface_id: &str,
        ip_id: &str,
    ) -> Result<()>;

    async fn set_primary_ipv4(&self, device_id: &str, ip_id: &str) -> Result<()>;

    /// Resolve a Netbox-style IPAM prefix into member addresses
    /// (`Targeting::InventoryPrefix`, spec §4.5).
    async fn resolve_prefix(&self, prefix_id: &str) -> Result<Vec<IpAddr>>;

    /// Resolve an IPAM range (`Targeting::InventoryIpRange`).
    async fn resolve_ip_range(&self, range_id: &str) -> Result<Vec<IpAddr>>;
}
