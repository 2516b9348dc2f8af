//! Stage 4 — Identification (spec §4.10 Stage 4): derive vendor, role,
//! model, and version from what Stage 3 collected. Falls back through
//! MAC OUI, a Windows port signature, and open-port role inference when
//! SNMP yielded nothing.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::discovery::DiscoveredDevice;
use crate::parsers;

/// Ordered `(pattern, vendor, role)` table; first match on `sysDescr` wins
/// (spec §4.10 Stage 4).
fn sys_descr_patterns() -> &'static Vec<(Regex, &'static str, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (Regex::new(r"(?i)cisco ios").unwrap(), "Cisco", "network"),
            (Regex::new(r"(?i)cisco nx-os").unwrap(), "Cisco", "network"),
            (Regex::new(r"(?i)junos").unwrap(), "Juniper", "network"),
            (Regex::new(r"(?i)arista").unwrap(), "Arista", "network"),
            (Regex::new(r"(?i)fortios|fortigate").unwrap(), "Fortinet", "firewall"),
            (Regex::new(r"(?i)pan-os|palo alto").unwrap(), "Palo Alto Networks", "firewall"),
            (Regex::new(r"(?i)hp.*procurve|aruba").unwrap(), "HP", "network"),
            (Regex::new(r"(?i)linux").unwrap(), "Linux", "server"),
            (Regex::new(r"(?i)windows").unwrap(), "Microsoft", "server"),
        ]
    })
}

/// Static MAC-OUI (first 3 octets, upper-hex, no separators) to vendor
/// table, used when SNMP identification fails (spec §4.10 Stage 4
/// Fallback 1).
fn oui_table() -> &'static [(&'static str, &'static str)] {
    &[
        ("000C29", "VMware"),
        ("001B63", "Apple"),
        ("00005E", "IANA"),
        ("0050C2", "IEEE"),
        ("F4CE46", "Cisco"),
        ("00E0FC", "Huawei"),
        ("B827EB", "Raspberry Pi Foundation"),
        ("001DD8", "Juniper"),
        ("0024D7", "Intel"),
    ]
}

const WINDOWS_PORTS: [u16; 6] = [135, 139, 445, 3389, 5985, 5986];

/// Role inferred from open ports alone, in priority order
/// (spec §4.10 Stage 4 Fallback 3).
const PORT_ROLE_PRIORITY: [(u16, &str); 7] = [
    (179, "network"),
    (443, "firewall"),
    (22, "server"),
    (554, "camera"),
    (9100, "printer"),
    (3260, "storage"),
    (161, "pdu"),
];

pub fn identify(devices: Vec<DiscoveredDevice>) -> Vec<DiscoveredDevice> {
    devices.into_iter().map(identify_one).collect()
}

fn identify_one(mut device: DiscoveredDevice) -> DiscoveredDevice {
    if let Some(descr) = device.description.clone() {
        let (vendor, role) = parsers::parse_sys_descr(&descr, sys_descr_patterns());
        device.vendor = device.vendor.or(vendor);
        device.device_role = device.device_role.or(role);
        device.model = device.model.or_else(|| parsers::extract_model(&descr));
        device.os_version = device.os_version.or_else(|| parsers::extract_version(&descr));
    }

    if device.vendor.is_none() {
        device.vendor = oui_vendor(device.mac_address.as_deref());
    }

    if device.vendor.is_none() && is_windows_signature(&device.open_ports) {
        device.vendor = Some("Microsoft".to_string());
        device.device_role = device.device_role.or(Some("server".to_string()));
    }

    if device.device_role.is_none() {
        device.device_role = role_from_open_ports(&device.open_ports);
    }

    if device.hostname.is_none() {
        device.hostname = device.dns_name.clone();
    }

    device
}

fn oui_vendor(mac: Option<&str>) -> Option<String> {
    let mac = mac?;
    let normalized: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect::<String>().to_uppercase();
    if normalized.len() < 6 {
        return None;
    }
    let prefix = &normalized[0..6];
    oui_table().iter().find(|(oui, _)| *oui == prefix).map(|(_, vendor)| vendor.to_string())
}

fn is_windows_signature(open_ports: &[u16]) -> bool {
    WINDOWS_PORTS.iter().filter(|p| open_ports.contains(p)).count() >= 2
}

fn role_from_open_ports(open_ports: &[u16]) -> Option<String> {
    PORT_ROLE_PRIORITY
        .iter()
        .find(|(port, _)| open_ports.contains(port))
        .map(|(_, role)| role.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn device(ip: &str) -> DiscoveredDevice {
        DiscoveredDevice::new(ip.parse::<IpAddr>().unwrap())
    }

    #[test]
    fn sys_descr_identifies_cisco_network_device() {
        let mut d = device("10.0.0.1");
        d.description = Some("Cisco IOS Software, C3750 Software (C3750-IPSERVICESK9-M), Version 12.2(58)SE2".into());
        let d = identify_one(d);
        assert_eq!(d.vendor.as_deref(), Some("Cisco"));
        assert_eq!(d.device_role.as_deref(), Some("network"));
        assert_eq!(d.model.as_deref(), Some("C3750"));
    }

    #[test]
    fn mac_oui_fallback_when_snmp_fails() {
        let mut d = device("10.0.0.2");
        d.mac_address = Some("00:0c:29:ab:cd:ef".into());
        let d = identify_one(d);
        assert_eq!(d.vendor.as_deref(), Some("VMware"));
    }

    #[test]
    fn windows_port_signature_fallback() {
        let mut d = device("10.0.0.3");
        d.open_ports = vec![135, 445, 3389];
        let d = identify_one(d);
        assert_eq!(d.vendor.as_deref(), Some("Microsoft"));
        assert_eq!(d.device_role.as_deref(), Some("server"));
    }

    #[test]
    fn hostname_falls_back_to_dns_name() {
        let mut d = device("10.0.0.4");
        d.dns_name = Some("host4.example.com".into());
        let d = identify_one(d);
        assert_eq!(d.hostname.as_deref(), Some("host4.example.com"));
    }
}
