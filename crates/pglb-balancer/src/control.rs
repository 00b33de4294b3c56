//! Control-connection management and topology refresh.
//!
//! One administrative connection per cluster, opened lazily and reused
//! across refreshes. Every failure path quarantines the offending control
//! host and fails over to an alternate known from the previous snapshot,
//! bounded by the number of candidates rather than recursing.

use std::time::{Duration, Instant};

use pglb_common::{replace_host_port, resolve_host, ControlConn, Error, Result, ServerEntry, Wire};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cluster::ClusterState;
use crate::load::HostLoad;
use crate::topology::Topology;

/// Deadline for opening the control connection and for the topology query.
pub(crate) const CONTROL_CONN_TIMEOUT: Duration = Duration::from_secs(15);

/// Produces a fresh topology snapshot on the cluster's control connection.
///
/// While this runs, the coordinator services no other request; acceptable
/// because refresh is infrequent and bounded by the 15 s deadline.
pub(crate) async fn refresh<W: Wire>(wire: &W, state: &mut ClusterState<W::Conn>) -> Result<()> {
    // Failover budget across control-host candidates known at entry.
    let mut attempts = state.topology.host_count() + 1;
    loop {
        if state.control.as_ref().map_or(true, |conn| conn.is_closed()) {
            let conn = open_control_conn(wire, state).await?;
            state.control = Some(conn);
        }
        let Some(conn) = state.control.as_mut() else {
            return Err(Error::Internal("control connection missing after open".into()));
        };

        let outcome = match timeout(CONTROL_CONN_TIMEOUT, conn.query_servers()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(CONTROL_CONN_TIMEOUT.as_millis() as u64)),
        };
        match outcome {
            Ok(entries) => {
                apply_snapshot(state, entries).await;
                return Ok(());
            }
            Err(err) => {
                warn!(
                    "could not query load information from {}: {}",
                    state.control_host, err
                );
                let away = state.control_host.clone();
                state.mark_host_away(&away);
                state.control = None;
                if attempts == 0 {
                    return Err(err);
                }
                attempts -= 1;
            }
        }
    }
}

/// Opens a control connection to the configured host, falling over to every
/// other host of the previous snapshot before giving up with the last
/// error.
async fn open_control_conn<W: Wire>(
    wire: &W,
    state: &mut ClusterState<W::Conn>,
) -> Result<W::Conn> {
    let mut config = wire.parse_config(&state.conn_string)?;
    config.host = resolve_host(&config.host).await;
    config.connect_timeout = Some(CONTROL_CONN_TIMEOUT);

    let first_err = match timeout(CONTROL_CONN_TIMEOUT, wire.connect(&config)).await {
        Ok(Ok(conn)) => {
            state.control_host = config.host.clone();
            state.conn_string = config.conn_string;
            return Ok(conn);
        }
        Ok(Err(err)) => err,
        Err(_) => Error::Timeout(CONTROL_CONN_TIMEOUT.as_millis() as u64),
    };
    warn!("could not create control connection to {}", config.host);
    state.mark_host_away(&config.host);

    let candidates: Vec<String> = state.topology.hosts().cloned().collect();
    if !candidates.is_empty() {
        warn!(
            "attempting control connection to {} other servers",
            candidates.len()
        );
    }
    let mut last_err = first_err;
    for host in candidates {
        let Some(port) = state.topology.port_of(&host) else {
            continue;
        };
        let rewritten = replace_host_port(&state.conn_string, &host, port);
        let mut candidate = match wire.parse_config(&rewritten) {
            Ok(parsed) => parsed,
            Err(err) => {
                last_err = err;
                continue;
            }
        };
        candidate.connect_timeout = Some(CONTROL_CONN_TIMEOUT);
        match timeout(CONTROL_CONN_TIMEOUT, wire.connect(&candidate)).await {
            Ok(Ok(conn)) => {
                info!("created control connection to host {}", host);
                state.control_host = host;
                state.conn_string = candidate.conn_string;
                return Ok(conn);
            }
            Ok(Err(err)) => {
                warn!("could not create control connection to host {}", host);
                state.mark_host_away(&candidate.host);
                last_err = err;
            }
            Err(_) => {
                warn!("control connection to host {} timed out", host);
                state.mark_host_away(&candidate.host);
                last_err = Error::Timeout(CONTROL_CONN_TIMEOUT.as_millis() as u64);
            }
        }
    }
    Err(last_err)
}

/// Swaps in the maps built from a successful topology query, carrying
/// forward counts for surviving hosts, then ages out the quarantine.
async fn apply_snapshot<C>(state: &mut ClusterState<C>, entries: Vec<ServerEntry>) {
    let mut topology = Topology::default();
    let mut load = HostLoad::default();
    for entry in &entries {
        let host = resolve_host(&entry.host).await;
        let public = resolve_host(&entry.public_ip).await;
        let primary = entry.is_primary();
        topology.add_server(
            &host,
            entry.port,
            &public,
            primary,
            &entry.cloud,
            &entry.region,
            &entry.zone,
        );
        let carried = state.load.carried(&host, primary);
        if primary {
            load.primary.insert(host, carried);
        } else {
            load.read_replica.insert(host, carried);
        }
    }
    state.topology = topology;
    state.load = load;
    state.last_refresh = Some(Instant::now());
    state.age_out_quarantine();
}
