//! Stage 5 — Reconciliation (spec §4.10 Stage 5): sync discovered
//! devices into Inventory under `sync_mode`/`match_by`/`device_naming`
//! policy. Per-device failures are caught and recorded; they never abort
//! the pipeline.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::model::discovery::{DeviceNaming, DiscoveredDevice, DiscoveryConfig, DiscoveryFailure, DiscoveryReport, MatchBy, SyncMode};
use crate::ports::inventory::{Device, DeviceLookup, DevicePatch, DeviceSpec, FindOrCreateEntity, InventoryPort};

const MANAGEMENT_INTERFACE: &str = "management";
const AUTODISCOVERED_TAG: &str = "autodiscovered";

fn concurrency_for(device_count: usize) -> usize {
    (num_cpus::get() * 5).min(device_count.max(1)).min(100)
}

pub async fn reconcile(devices: Vec<DiscoveredDevice>, config: &DiscoveryConfig, inventory: &dyn InventoryPort) -> DiscoveryReport {
    if devices.is_empty() {
        return DiscoveryReport::default();
    }
    let semaphore = Arc::new(Semaphore::new(concurrency_for(devices.len())));

    let futures = devices.into_iter().map(|device| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let ip = device.ip_address;
            (ip, reconcile_one(device, config, inventory).await)
        }
    });

    let mut report = DiscoveryReport::default();
    for (ip, outcome) in join_all(futures).await {
        match outcome {
            Ok(Outcome::Created(name)) => report.created.push(name),
            Ok(Outcome::Updated(name)) => report.updated.push(name),
            Ok(Outcome::Skipped(name)) => report.skipped.push(name),
            Err(message) => report.failed.push(DiscoveryFailure { ip_address: ip, message }),
        }
    }
    report
}

enum Outcome {
    Created(String),
    Updated(String),
    Skipped(String),
}

async fn reconcile_one(
    device: DiscoveredDevice,
    config: &DiscoveryConfig,
    inventory: &dyn InventoryPort,
) -> Result<Outcome, String> {
    let name = derive_name(&device, config);
    let matched = find_match(&device, &name, config.match_by, inventory).await.map_err(|e| e.to_string())?;

    let (record, outcome) = match (matched, config.sync_mode) {
        (Some(_), SyncMode::CreateOnly) => return Ok(Outcome::Skipped(name)),
        (Some(existing), _) => {
            let patch = missing_fields_patch(&existing, &device);
            if patch.is_empty() {
                // No change needed; mirrors `netbox_autodiscovery_executor.py`'s
                // `_update_device` returning `'skipped'` when the patch is empty.
                (existing, Outcome::Skipped(name.clone()))
            } else {
                let updated = inventory.update_device(&existing.id, patch).await.map_err(|e| e.to_string())?;
                (updated, Outcome::Updated(name.clone()))
            }
        }
        (None, SyncMode::UpdateOnly) => return Ok(Outcome::Skipped(name)),
        (None, _) => {
            let created = create_device(&device, &name, config, inventory).await.map_err(|e| e.to_string())?;
            (created, Outcome::Created(name.clone()))
        }
    };

    inventory
        .find_or_create(FindOrCreateEntity::Tag, AUTODISCOVERED_TAG)
        .await
        .map_err(|e| e.to_string())?;

    ensure_management_ip(&record, &device, inventory).await.map_err(|e| e.to_string())?;

    Ok(outcome)
}

fn derive_name(device: &DiscoveredDevice, config: &DiscoveryConfig) -> String {
    let ip = device.ip_address.to_string();
    match config.device_naming {
        DeviceNaming::HostnameOrIp => device.hostname.clone().or_else(|| device.dns_name.clone()).unwrap_or(ip),
        DeviceNaming::HostnameOnly => device.hostname.clone().unwrap_or(ip),
        DeviceNaming::IpOnly => ip,
        DeviceNaming::PrefixIp => match &config.name_prefix {
            Some(prefix) => format!("{prefix}{ip}"),
            None => ip,
        },
        DeviceNaming::DnsReverse => device.dns_name.clone().unwrap_or(ip),
    }
}

async fn find_match(
    device: &DiscoveredDevice,
    name: &str,
    match_by: MatchBy,
    inventory: &dyn InventoryPort,
) -> crate::error::Result<Option<Device>> {
    match match_by {
        MatchBy::Ip => inventory.find_device(DeviceLookup { ip: Some(device.ip_address), ..Default::default() }).await,
        MatchBy::Name => inventory.find_device(DeviceLookup { name: Some(name), ..Default::default() }).await,
        MatchBy::IpOrName => {
            let by_ip = inventory.find_device(DeviceLookup { ip: Some(device.ip_address), ..Default::default() }).await?;
            if by_ip.is_some() {
                return Ok(by_ip);
            }
            inventory.find_device(DeviceLookup { name: Some(name), ..Default::default() }).await
        }
        MatchBy::Mac => match device.mac_address.as_deref() {
            Some(mac) => inventory.find_device(DeviceLookup { mac: Some(mac), ..Default::default() }).await,
            None => Ok(None),
        },
        MatchBy::Serial => match device.serial.as_deref() {
            Some(serial) => inventory.find_device(DeviceLookup { serial: Some(serial), ..Default::default() }).await,
            None => Ok(None),
        },
    }
}

fn missing_fields_patch(existing: &Device, discovered: &DiscoveredDevice) -> DevicePatch {
    DevicePatch {
        serial: if existing.serial.is_none() { discovered.serial.clone() } else { None },
        description: if existing.description.is_none() { discovered.description.clone() } else { None },
    }
}

async fn create_device(
    device: &DiscoveredDevice,
    name: &str,
    config: &DiscoveryConfig,
    inventory: &dyn InventoryPort,
) -> crate::error::Result<Device> {
    let manufacturer = resolve_entity(config.auto_create_manufacturer, device.vendor.as_deref(), FindOrCreateEntity::Manufacturer, inventory).await?;
    let device_type = resolve_entity(config.auto_create_device_type, device.model.as_deref(), FindOrCreateEntity::DeviceType, inventory).await?;
    let role = resolve_entity(config.auto_create_role, device.device_role.as_deref(), FindOrCreateEntity::DeviceRole, inventory).await?;

    inventory
        .create_device(DeviceSpec {
            name: name.to_string(),
            manufacturer,
            device_type,
            role,
            serial: device.serial.clone(),
            description: device.description.clone(),
        })
        .await
}

async fn resolve_entity(
    auto_create: bool,
    value: Option<&str>,
    entity: FindOrCreateEntity,
    inventory: &dyn InventoryPort,
) -> crate::error::Result<Option<String>> {
    match value {
        Some(v) if auto_create => Ok(Some(inventory.find_or_create(entity, v).await?)),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}

async fn ensure_management_ip(device: &Device, discovered: &DiscoveredDevice, inventory: &dyn InventoryPort) -> crate::error::Result<()> {
    let interface = inventory.find_or_create_interface(&device.id, MANAGEMENT_INTERFACE).await?;
    let ip = inventory.find_or_create_ip(&discovered.ip_address.to_string()).await?;
    inventory.assign_ip(&device.id, &interface.id, &ip.id).await?;
    inventory.set_primary_ipv4(&device.id, &ip.id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeInventory;
    use std::net::IpAddr;

    fn device(ip: &str) -> DiscoveredDevice {
        let mut d = DiscoveredDevice::new(ip.parse::<IpAddr>().unwrap());
        d.hostname = Some(format!("host-{ip}"));
        d
    }

    #[tokio::test]
    async fn new_device_is_created_and_tagged() {
        let inventory = FakeInventory::default();
        let config = DiscoveryConfig::default();
        let report = reconcile(vec![device("10.0.0.1")], &config, &inventory).await;
        assert_eq!(report.created.len(), 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn create_only_mode_skips_existing_match() {
        let inventory = FakeInventory::default();
        let config = DiscoveryConfig { sync_mode: SyncMode::CreateOnly, ..Default::default() };
        reconcile(vec![device("10.0.0.2")], &config, &inventory).await;

        let report = reconcile(vec![device("10.0.0.2")], &config, &inventory).await;
        assert_eq!(report.skipped.len(), 1);
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn update_only_mode_skips_unmatched() {
        let inventory = FakeInventory::default();
        let config = DiscoveryConfig { sync_mode: SyncMode::UpdateOnly, ..Default::default() };
        let report = reconcile(vec![device("10.0.0.3")], &config, &inventory).await;
        assert_eq!(report.skipped.len(), 1);
        assert!(report.created.is_empty());
    }
}
