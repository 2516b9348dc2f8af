//! DiscoveredDevice and the discovery pipeline's input/output types
//! (spec §3 "DiscoveredDevice", §4.10).

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub ip_address: IpAddr,
    pub dns_name: Option<String>,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub serial: Option<String>,
    pub device_role: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub contact: Option<String>,
    pub uptime: Option<u64>,
    pub open_ports: Vec<u16>,
    pub services: Vec<String>,
    pub interfaces: Vec<InterfaceFact>,
    pub snmp_success: bool,
}

impl DiscoveredDevice {
    pub fn new(ip_address: IpAddr) -> Self {
        Self {
            ip_address,
            dns_name: None,
            hostname: None,
            mac_address: None,
            vendor: None,
            model: None,
            os_version: None,
            serial: None,
            device_role: None,
            description: None,
            location: None,
            contact: None,
            uptime: None,
            open_ports: Vec::new(),
            services: Vec::new(),
            interfaces: Vec::new(),
            snmp_success: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InterfaceFact {
    pub port: u32,
    pub status: Option<String>,
    pub speed: Option<String>,
    pub medium: Option<String>,
    pub lldp_neighbor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    CreateOnly,
    UpdateOnly,
    #[default]
    CreateUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBy {
    Ip,
    Name,
    #[default]
    IpOrName,
    Mac,
    Serial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceNaming {
    #[default]
    HostnameOrIp,
    HostnameOnly,
    IpOnly,
    PrefixIp,
    DnsReverse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub sync_mode: SyncMode,
    pub match_by: MatchBy,
    pub device_naming: DeviceNaming,
    #[serde(default)]
    pub name_prefix: Option<String>,
    #[serde(default = "default_true")]
    pub auto_create_manufacturer: bool,
    #[serde(default = "default_true")]
    pub auto_create_device_type: bool,
    #[serde(default = "default_true")]
    pub auto_create_role: bool,
    #[serde(default)]
    pub reverse_dns_enabled: bool,
    #[serde(default = "default_ports")]
    pub scan_ports: Vec<u16>,
    #[serde(default = "default_communities")]
    pub snmp_communities: Vec<String>,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_ports() -> Vec<u16> {
    vec![22, 23, 80, 135, 139, 161, 443, 445, 3389, 5985, 5986]
}
fn default_communities() -> Vec<String> {
    vec!["public".to_string()]
}
fn default_ping_timeout() -> u64 {
    1000
}
fn default_ping_count() -> u32 {
    2
}
fn default_tcp_timeout() -> u64 {
    1000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::CreateUpdate,
            match_by: MatchBy::IpOrName,
            device_naming: DeviceNaming::HostnameOrIp,
            name_prefix: None,
            auto_create_manufacturer: true,
            auto_create_device_type: true,
            auto_create_role: true,
            reverse_dns_enabled: true,
            scan_ports: default_ports(),
            snmp_communities: default_communities(),
            ping_timeout_ms: default_ping_timeout(),
            ping_count: default_ping_count(),
            tcp_timeout_ms: default_tcp_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<DiscoveryFailure>,
    pub totals: DiscoveryTotals,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryFailure {
    pub ip_address: IpAddr,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryTotals {
    pub targets: usize,
    pub live: usize,
    pub identified: usize,
}
