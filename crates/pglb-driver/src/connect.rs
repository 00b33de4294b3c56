//! Balanced connect with bounded retries.

use std::collections::HashMap;
use std::time::Instant;

use pglb_balancer::{AcquireRequest, Balancer, ChosenHost};
use pglb_common::{replace_host_port, ConnectConfig, Error, Result, Wire};
use tokio::time::timeout;
use tracing::warn;

/// Dial attempts after the first before the most recent error is returned.
pub const MAX_RETRIES: usize = 20;

/// Connects to the least-loaded permitted host of the cluster named by
/// `config`, retrying alternates on dial failure.
///
/// The caller's config is never mutated; every redial derives a fresh
/// rewritten copy. A `connect_timeout` on the config is captured as an
/// overall deadline and each dial runs under the remaining budget.
pub async fn connect_load_balanced<W: Wire>(
    wire: &W,
    balancer: &Balancer,
    config: &ConnectConfig,
) -> Result<W::Conn> {
    if !config.load_balance.is_enabled() {
        return wire.connect(config).await;
    }
    let deadline = config.connect_timeout.map(|budget| Instant::now() + budget);

    let chosen = match balancer.acquire(AcquireRequest::new(config.clone())).await {
        Ok(chosen) => chosen,
        Err(err) if err.is_fallback() => return Err(err),
        Err(err) => {
            warn!("load balancer failed ({}), falling back to a direct connect", err);
            return wire.connect(config).await;
        }
    };
    connect_with_retries(wire, balancer, config, chosen, deadline).await
}

async fn connect_with_retries<W: Wire>(
    wire: &W,
    balancer: &Balancer,
    original: &ConnectConfig,
    mut chosen: ChosenHost,
    deadline: Option<Instant>,
) -> Result<W::Conn> {
    let mut config = rewrite_for(wire, original, &chosen)?;
    let mut result = dial(wire, &config, deadline).await;

    for attempt in 1..=MAX_RETRIES {
        let err = match result {
            Ok(conn) => return Ok(conn),
            Err(err) => err,
        };
        // Give the count back and quarantine the host before re-asking, so
        // the next selection sees the corrected table.
        balancer.decrement(&chosen.cluster, &config.host).await;
        warn!(
            attempt,
            "marking {} unavailable after failed dial: {}", chosen.host, err
        );
        let mut request = AcquireRequest::new(original.clone());
        request.unavailable = HashMap::from([(chosen.host.clone(), Instant::now())]);

        chosen = balancer.acquire(request).await?;
        config = rewrite_for(wire, original, &chosen)?;
        result = dial(wire, &config, deadline).await;
    }

    match result {
        Ok(conn) => Ok(conn),
        Err(err) => {
            balancer.decrement(&chosen.cluster, &config.host).await;
            Err(err)
        }
    }
}

/// Derives the config actually dialed for a chosen host. Fallback hosts
/// beyond the first are discarded: the balancer, not the multi-host URL,
/// drives failover.
fn rewrite_for<W: Wire>(
    wire: &W,
    original: &ConnectConfig,
    chosen: &ChosenHost,
) -> Result<ConnectConfig> {
    let rewritten = replace_host_port(&original.conn_string, &chosen.host, chosen.port);
    if chosen.host == original.host {
        let mut config = original.clone();
        config.fallbacks.truncate(1);
        config.conn_string = rewritten;
        Ok(config)
    } else {
        let parsed = wire.parse_config(&rewritten)?;
        let mut config = original.clone();
        config.host = parsed.host;
        config.port = parsed.port;
        config.fallbacks = parsed.fallbacks;
        config.conn_string = parsed.conn_string;
        Ok(config)
    }
}

/// One dial under whatever remains of the overall deadline.
async fn dial<W: Wire>(
    wire: &W,
    config: &ConnectConfig,
    deadline: Option<Instant>,
) -> Result<W::Conn> {
    match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(0));
            }
            match timeout(remaining, wire.connect(config)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(remaining.as_millis() as u64)),
            }
        }
        None => wire.connect(config).await,
    }
}
