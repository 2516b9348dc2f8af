//! Discovery / Autodiscovery Pipeline (spec §4.10, C10): five fan-out
//! stages from target expansion to inventory reconciliation.

pub mod stage1_targets;
pub mod stage2_liveness;
pub mod stage3_enrichment;
pub mod stage4_identify;
pub mod stage5_reconcile;

use std::time::Instant;

use crate::model::discovery::{DiscoveryConfig, DiscoveryReport, DiscoveryTotals};
use crate::model::job::ExecutionContext;
use crate::model::targeting::Targeting;
use crate::ports::inventory::InventoryPort;
use crate::ports::probe::ProbeAdapter;

/// Runs all five stages in order and returns the reconciliation report
/// (spec §4.10 output: `{created, updated, skipped, failed, report}`).
pub async fn run_pipeline(
    targeting: &Targeting,
    config: &DiscoveryConfig,
    probe: &dyn ProbeAdapter,
    inventory: &dyn InventoryPort,
) -> DiscoveryReport {
    let started = Instant::now();
    let ctx = ExecutionContext::new(crate::model::value::Value::Null);

    let targets = stage1_targets::expand(targeting, &ctx, inventory).await;
    let live = stage2_liveness::sweep(&targets, config, probe).await;
    let enriched = stage3_enrichment::enrich(&live, config, probe).await;
    let identified = stage4_identify::identify(enriched);

    let mut report = stage5_reconcile::reconcile(identified, config, inventory).await;
    report.totals = DiscoveryTotals {
        targets: targets.len(),
        live: live.len(),
        identified: report.created.len() + report.updated.len() + report.skipped.len(),
    };
    report.duration_seconds = started.elapsed().as_secs_f64();
    report
}
