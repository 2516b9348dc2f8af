//! Target Resolver (spec §4.5, C5): `resolve(Targeting) -> [IP]`, a pure
//! function apart from the `DatabaseQuery`/`GroupReference`/
//! `InventoryPrefix`/`InventoryIpRange` variants which need a port call.

use std::net::{IpAddr, Ipv4Addr};

use crate::model::job::ExecutionContext;
use crate::model::targeting::Targeting;
use crate::ports::inventory::InventoryPort;

/// Expand an IPv4 CIDR, excluding network/broadcast for prefixes <= 30
/// (spec §4.5, §8 invariant 5).
pub fn expand_cidr(cidr: &str) -> Result<Vec<IpAddr>, String> {
    let (addr_str, prefix_str) = cidr
        .split_once('/')
        .ok_or_else(|| format!("not a CIDR: {cidr}"))?;
    let addr: Ipv4Addr = addr_str
        .parse()
        .map_err(|_| format!("bad address in CIDR: {cidr}"))?;
    let prefix: u32 = prefix_str
        .parse()
        .map_err(|_| format!("bad prefix in CIDR: {cidr}"))?;
    if prefix > 32 {
        return Err(format!("prefix out of range: {cidr}"));
    }

    let base = u32::from(addr);
    let host_bits = 32 - prefix;
    let mask = if host_bits == 32 {
        0
    } else {
        !0u32 << host_bits
    };
    let network = base & mask;
    let count: u64 = 1u64 << host_bits;

    let mut out = Vec::new();
    for i in 0..count {
        let ip = network.wrapping_add(i as u32);
        if prefix <= 30 {
            let broadcast = network | !mask;
            if ip == network || ip == broadcast {
                continue;
            }
        }
        out.push(IpAddr::V4(Ipv4Addr::from(ip)));
    }
    Ok(out)
}

/// Inclusive IP range expansion.
pub fn expand_ip_range(start: IpAddr, end: IpAddr) -> Vec<IpAddr> {
    match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) => {
            let s = u32::from(s);
            let e = u32::from(e);
            if e < s {
                return Vec::new();
            }
            (s..=e).map(|i| IpAddr::V4(Ipv4Addr::from(i))).collect()
        }
        _ => Vec::new(),
    }
}

/// Parses one target-per-line input accepting CIDR, a single IP, or an
/// `A-B` range; invalid lines are skipped, never fatal (spec §4.5).
pub fn expand_mixed_list(lines: &[String]) -> Vec<IpAddr> {
    let mut out = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.contains('/') {
            if let Ok(ips) = expand_cidr(line) {
                out.extend(ips);
            }
            continue;
        }
        if let Some((a, b)) = line.split_once('-') {
            if let (Ok(start), Ok(end)) = (a.trim().parse(), b.trim().parse()) {
                out.extend(expand_ip_range(start, end));
                continue;
            }
        }
        if let Ok(ip) = line.parse::<IpAddr>() {
            out.push(ip);
        }
    }
    out
}

fn dedup_stable(ips: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut seen = std::collections::HashSet::new();
    ips.into_iter().filter(|ip| seen.insert(*ip)).collect()
}

/// Resolve a `Targeting` value against ports and the run's
/// `ExecutionContext`. `DatabaseQuery`/`GroupReference` have no port in
/// this core (spec §1: persistence schema is semantic-only); they resolve
/// to empty rather than raising, matching the "never fatal" rule in §4.5.
pub async fn resolve(
    targeting: &Targeting,
    ctx: &ExecutionContext,
    inventory: &dyn InventoryPort,
) -> Vec<IpAddr> {
    let raw: Vec<IpAddr> = match targeting {
        Targeting::StaticList { ips } => expand_mixed_list(ips),
        Targeting::NetworkRange { cidr, exclude } => {
            let mut ips = expand_cidr(cidr).unwrap_or_default();
            let excluded: std::collections::HashSet<IpAddr> = exclude
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            ips.retain(|ip| !excluded.contains(ip));
            return dedup_stable(ips);
        }
        Targeting::IpRange { start, end } => expand_ip_range(*start, *end),
        Targeting::DatabaseQuery { .. } => Vec::new(),
        Targeting::GroupReference { .. } => Vec::new(),
        Targeting::PreviousResult { field } => ctx
            .previous_result_field(field)
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect(),
        Targeting::InventoryPrefix { prefix_id } => {
            inventory.resolve_prefix(prefix_id).await.unwrap_or_default()
        }
        Targeting::InventoryIpRange { range_id } => inventory
            .resolve_ip_range(range_id)
            .await
            .unwrap_or_default(),
    };
    dedup_stable(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_30_excludes_network_and_broadcast() {
        let ips = expand_cidr("192.168.1.0/30").unwrap();
        let strs: Vec<String> = ips.iter().map(|i| i.to_string()).collect();
        assert_eq!(strs, vec!["192.168.1.1", "192.168.1.2"]);
    }

    #[test]
    fn cidr_31_keeps_both() {
        let ips = expand_cidr("10.0.0.0/31").unwrap();
        assert_eq!(ips.len(), 2);
    }

    #[test]
    fn cidr_32_keeps_one() {
        let ips = expand_cidr("10.0.0.5/32").unwrap();
        assert_eq!(ips.len(), 1);
    }

    #[test]
    fn mixed_list_skips_invalid_lines() {
        let lines = vec![
            "10.0.0.1".to_string(),
            "not-an-ip".to_string(),
            "10.0.0.10-10.0.0.12".to_string(),
        ];
        let ips = expand_mixed_list(&lines);
        assert_eq!(ips.len(), 4);
    }

    #[test]
    fn dedup_is_order_stable() {
        let ips = vec![
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        ];
        let out = dedup_stable(ips);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }
}
