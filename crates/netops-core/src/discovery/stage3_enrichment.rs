//! Stage 3 — Host enrichment (spec §4.10 Stage 3): for each live IP,
//! collect reverse DNS, ARP/MAC, an open-port scan, and an SNMP
//! fingerprint (first community with any non-null response wins).

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::model::discovery::{DiscoveredDevice, DiscoveryConfig};
use crate::ports::probe::ProbeAdapter;

/// The six MIB-II system OIDs queried per community (spec §4.10 Stage 3).
pub const SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
pub const SYS_OBJECT_ID: &str = "1.3.6.1.2.1.1.2.0";
pub const SYS_UPTIME: &str = "1.3.6.1.2.1.1.3.0";
pub const SYS_CONTACT: &str = "1.3.6.1.2.1.1.4.0";
pub const SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
pub const SYS_LOCATION: &str = "1.3.6.1.2.1.1.6.0";

const SYSTEM_OIDS: [&str; 6] = [SYS_DESCR, SYS_OBJECT_ID, SYS_UPTIME, SYS_CONTACT, SYS_NAME, SYS_LOCATION];

pub struct SnmpFacts {
    pub sys_descr: Option<String>,
    pub sys_name: Option<String>,
    pub sys_location: Option<String>,
    pub sys_contact: Option<String>,
    pub sys_uptime: Option<String>,
}

pub async fn enrich(live: &[IpAddr], config: &DiscoveryConfig, probe: &dyn ProbeAdapter) -> Vec<DiscoveredDevice> {
    if live.is_empty() {
        return Vec::new();
    }
    let semaphore = Arc::new(Semaphore::new(super::stage2_liveness::concurrency_for(live.len())));

    let futures = live.iter().copied().map(|ip| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.ok();
            enrich_one(ip, config, probe).await
        }
    });

    join_all(futures).await
}

async fn enrich_one(ip: IpAddr, config: &DiscoveryConfig, probe: &dyn ProbeAdapter) -> DiscoveredDevice {
    let mut device = DiscoveredDevice::new(ip);

    if config.reverse_dns_enabled {
        device.dns_name = probe.reverse_dns(ip).await.ok().flatten();
    }
    device.mac_address = probe.arp_lookup(ip).await.ok().flatten();
    device.open_ports = scan_ports(ip, config, probe).await;

    if let Some(facts) = snmp_fingerprint(ip, config, probe).await {
        device.snmp_success = true;
        device.description = facts.sys_descr.clone();
        device.hostname = facts.sys_name.clone();
        device.location = facts.sys_location;
        device.contact = facts.sys_contact;
        device.uptime = facts.sys_uptime.and_then(|v| v.parse().ok());
    }

    device
}

async fn scan_ports(ip: IpAddr, config: &DiscoveryConfig, probe: &dyn ProbeAdapter) -> Vec<u16> {
    let timeout = Duration::from_millis(config.tcp_timeout_ms);
    let futures = config.scan_ports.iter().copied().map(|port| async move {
        let open = probe.tcp_probe(ip, port, timeout).await.map(|o| o.open).unwrap_or(false);
        open.then_some(port)
    });
    join_all(futures).await.into_iter().flatten().collect()
}

/// Tries each configured community string in order; the first with any
/// non-null OID response wins (spec §4.10 Stage 3).
async fn snmp_fingerprint(ip: IpAddr, config: &DiscoveryConfig, probe: &dyn ProbeAdapter) -> Option<SnmpFacts> {
    let timeout = Duration::from_secs(2);
    for community in &config.snmp_communities {
        let futures = SYSTEM_OIDS.iter().map(|oid| probe.snmp_get(ip, community, oid, timeout));
        let results: Vec<Option<String>> = join_all(futures).await.into_iter().map(|r| r.ok().flatten()).collect();

        if results.iter().any(Option::is_some) {
            return Some(SnmpFacts {
                sys_descr: results[0].clone(),
                sys_name: results[4].clone(),
                sys_location: results[5].clone(),
                sys_contact: results[3].clone(),
                sys_uptime: results[2].clone(),
            });
        }
    }
    None
}
