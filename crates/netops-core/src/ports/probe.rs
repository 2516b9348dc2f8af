//! Probe Adapters (spec §4.4, C4).
//!
//! Each adapter returns a structured outcome and never raises for expected
//! negative results — offline, closed port, SNMP timeout surface as
//! `reachable=false`/`open=false`/`None`, not as `Err`. Adapters are
//! assumed thread-safe and stateless beyond internal connection pools,
//! same assumption the teacher makes of its HTTP/SSH clients.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct PingOutcome {
    pub reachable: bool,
    pub rtt_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct TcpOutcome {
    pub open: bool,
}

#[derive(Debug, Clone)]
pub struct SshOutput {
    pub output: String,
    pub succeeded: bool,
}

#[async_trait]
pub trait ProbeAdapter: Send + Sync {
    async fn ping(&self, ip: IpAddr, count: u32, timeout: Duration) -> Result<PingOutcome>;

    async fn tcp_probe(&self, ip: IpAddr, port: u16, timeout: Duration) -> Result<TcpOutcome>;

    /// Returns `None` on timeout or "no such object" (spec §4.4).
    async fn snmp_get(
        &self,
        ip: IpAddr,
        community: &str,
        oid: &str,
        timeout: Duration,
    ) -> Result<Option<String>>;

    /// Concatenated stdout+stderr; empty on connection failure.
    async fn ssh_exec(
        &self,
        ip: IpAddr,
        username: &str,
        password: Option<&str>,
        port: u16,
        command: &str,
        timeout: Duration,
    ) -> Result<SshOutput>;

    async fn reverse_dns(&self, ip: IpAddr) -> Result<Option<String>>;

    /// Best-effort ARP/neighbor-cache MAC lookup; empty on miss
    /// (spec §4.10 Stage 3).
    async fn arp_lookup(&self, ip: IpAddr) -> Result<Option<String>>;
}
