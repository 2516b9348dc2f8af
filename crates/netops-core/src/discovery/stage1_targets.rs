//! Stage 1 — Target expansion (spec §4.10 Stage 1): same contract as the
//! Target Resolver (§4.5), plus `InventoryPrefix`/`InventoryIpRange`
//! support, which the resolver already implements through the Inventory
//! Port.

use std::net::IpAddr;

use crate::model::job::ExecutionContext;
use crate::model::targeting::Targeting;
use crate::ports::inventory::InventoryPort;
use crate::resolver::target;

pub async fn expand(targeting: &Targeting, ctx: &ExecutionContext, inventory: &dyn InventoryPort) -> Vec<IpAddr> {
    target::resolve(targeting, ctx, inventory).await
}
