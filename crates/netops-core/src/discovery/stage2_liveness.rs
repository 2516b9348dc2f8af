//! Stage 2 — Liveness (spec §4.10 Stage 2): bounded-concurrency ping
//! sweep. Concurrency = `min(cpu_count * 50, |targets|, 1000)`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::model::discovery::DiscoveryConfig;
use crate::ports::probe::ProbeAdapter;

pub fn concurrency_for(target_count: usize) -> usize {
    (num_cpus::get() * 50).min(target_count.max(1)).min(1000)
}

pub async fn sweep(targets: &[IpAddr], config: &DiscoveryConfig, probe: &dyn ProbeAdapter) -> Vec<IpAddr> {
    if targets.is_empty() {
        return Vec::new();
    }
    let semaphore = Arc::new(Semaphore::new(concurrency_for(targets.len())));
    let timeout = Duration::from_millis(config.ping_timeout_ms);
    let count = config.ping_count;

    let futures = targets.iter().copied().map(|ip| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            let reachable = probe.ping(ip, count, timeout).await.map(|o| o.reachable).unwrap_or(false);
            reachable.then_some(ip)
        }
    });

    join_all(futures).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_bounded_by_target_count_and_ceiling() {
        assert_eq!(concurrency_for(5), 5);
        assert!(concurrency_for(10_000) <= 1000);
    }
}
