//! End-to-end integration test for the Discovery Pipeline (spec §4.10):
//! drives all five stages against the in-memory port fakes, from a
//! static target list down to a reconciled Inventory device.

use netops_core::discovery::{run_pipeline, stage3_enrichment};
use netops_core::model::discovery::DiscoveryConfig;
use netops_core::model::targeting::Targeting;
use netops_core::testkit::{FakeInventory, FakeProbe};

#[tokio::test]
async fn discovers_and_reconciles_a_cisco_switch() {
    let probe = FakeProbe::default();
    let inventory = FakeInventory::default();
    let ip = "10.10.0.1".parse().unwrap();

    probe.set_reachable(ip).await;
    probe
        .set_snmp(
            ip,
            stage3_enrichment::SYS_DESCR,
            "Cisco IOS Software, C3750 Software (C3750-IPSERVICESK9-M), Version 12.2(58)SE2",
        )
        .await;
    probe.set_snmp(ip, stage3_enrichment::SYS_NAME, "sw-core-01").await;
    probe.set_open_port(ip, 22).await;

    let targeting = Targeting::StaticList { ips: vec!["10.10.0.1".to_string()] };
    let config = DiscoveryConfig::default();

    let report = run_pipeline(&targeting, &config, &probe, &inventory).await;

    assert_eq!(report.totals.targets, 1);
    assert_eq!(report.totals.live, 1);
    assert_eq!(report.created.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.created[0], "sw-core-01");
}

#[tokio::test]
async fn unreachable_targets_never_reach_reconciliation() {
    let probe = FakeProbe::default();
    let inventory = FakeInventory::default();

    let targeting = Targeting::StaticList { ips: vec!["10.10.0.2".to_string()] };
    let config = DiscoveryConfig::default();

    let report = run_pipeline(&targeting, &config, &probe, &inventory).await;

    assert_eq!(report.totals.targets, 1);
    assert_eq!(report.totals.live, 0);
    assert!(report.created.is_empty());
    assert!(report.updated.is_empty());
}

#[tokio::test]
async fn rerunning_discovery_over_unchanged_inventory_skips_not_updates() {
    let probe = FakeProbe::default();
    let inventory = FakeInventory::default();
    let ip = "10.10.0.3".parse().unwrap();

    probe.set_reachable(ip).await;
    probe.set_snmp(ip, stage3_enrichment::SYS_NAME, "host-3").await;

    let targeting = Targeting::StaticList { ips: vec!["10.10.0.3".to_string()] };
    let config = DiscoveryConfig::default();

    let first = run_pipeline(&targeting, &config, &probe, &inventory).await;
    assert_eq!(first.created.len(), 1);

    let second = run_pipeline(&targeting, &config, &probe, &inventory).await;
    assert_eq!(second.skipped.len(), 1);
    assert!(second.updated.is_empty());
    assert!(second.created.is_empty());
}
