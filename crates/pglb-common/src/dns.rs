//! Canonical host resolution.

use std::net::SocketAddr;

use tokio::net::lookup_host;

/// Resolves `host` to the canonical address the balancer keys its state by.
///
/// The first IPv4 answer wins; with no IPv4 answer the first answer of any
/// family is used. Resolution failures degrade silently to the literal
/// input, so two seed hostnames resolving to the same address share one
/// cluster state while an unresolvable name still works as an opaque key.
pub async fn resolve_host(host: &str) -> String {
    match lookup_host((host, 0)).await {
        Ok(addrs) => {
            let addrs: Vec<SocketAddr> = addrs.collect();
            if let Some(v4) = addrs.iter().find(|addr| addr.is_ipv4()) {
                return v4.ip().to_string();
            }
            match addrs.first() {
                Some(addr) => addr.ip().to_string(),
                None => host.to_string(),
            }
        }
        Err(_) => host.to_string(),
    }
}
