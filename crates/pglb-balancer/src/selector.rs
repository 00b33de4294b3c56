//! Least-loaded host selection.
//!
//! Pure function over a cluster state: builds the candidate pool for the
//! configured load-balance mode, walks the topology-key preference tiers in
//! order, filters quarantined hosts, and picks uniformly at random among
//! the hosts tied at the minimum connection count. Committing a choice
//! increments its counter, so selection and accounting cannot race.

use std::cmp::Ordering;
use std::collections::HashMap;

use pglb_common::{Error, LoadBalance, Result};
use rand::Rng;
use tracing::warn;

use crate::cluster::{AddressMode, ClusterState};
use crate::coordinator::ChosenHost;

pub(crate) fn select_host<C>(state: &mut ClusterState<C>) -> Result<ChosenHost> {
    loop {
        let (zones, loads) = candidate_pool(state);

        let mut min_count = u32::MAX;
        let mut winners: Vec<String> = Vec::new();

        // Preference tiers: the first tier with any available host wins.
        if let Some(tiers) = &state.topology_keys {
            for tier in tiers {
                let mut tier_hosts: Vec<&String> = Vec::new();
                for key in tier {
                    if let Some(hosts) = zones.get(rollup(key)) {
                        tier_hosts.extend(hosts);
                    }
                }
                for host in tier_hosts {
                    if is_host_away(state, host) {
                        continue;
                    }
                    let count = loads.get(host).copied().unwrap_or(0);
                    match count.cmp(&min_count) {
                        Ordering::Less => {
                            min_count = count;
                            winners.clear();
                            winners.push(host.clone());
                        }
                        Ordering::Equal => winners.push(host.clone()),
                        Ordering::Greater => {}
                    }
                }
                if !winners.is_empty() {
                    break;
                }
            }
        }

        // No tier produced a survivor (or there were no tiers).
        if winners.is_empty() {
            match state.load_balance {
                LoadBalance::PreferPrimary | LoadBalance::PreferRr => {
                    (min_count, winners) = least_loaded(&loads, state);
                    if winners.is_empty() {
                        // widen to the opposite role
                        let opposite = match state.load_balance {
                            LoadBalance::PreferRr => state.load.primary.clone(),
                            _ => state.load.read_replica.clone(),
                        };
                        (min_count, winners) = least_loaded(&opposite, state);
                    }
                }
                _ => {
                    if state.topology_keys.is_none() || !state.fallback_to_topology_keys_only {
                        (min_count, winners) = least_loaded(&loads, state);
                    } else {
                        return Err(Error::FallbackToOriginal);
                    }
                }
            }
        }

        if winners.is_empty() {
            if state.mode == AddressMode::TryBoth {
                // Private addresses are exhausted: clear them from the
                // quarantine and re-select advertising public addresses.
                let privates: Vec<String> = state.topology.public_of.keys().cloned().collect();
                for host in privates {
                    state.quarantine.remove(&host);
                }
                state.mode = AddressMode::Exhausted;
                continue;
            }
            warn!("no hosts found, returning no-servers");
            return Err(Error::NoServers);
        }

        let index = rand::thread_rng().gen_range(0..winners.len());
        let winner = winners.swap_remove(index);

        let advertised = match state.mode {
            AddressMode::UsePublicIp | AddressMode::Exhausted => {
                match state.topology.public_of.get(&winner) {
                    Some(public) if !public.is_empty() => public.clone(),
                    _ => {
                        warn!("no public address known for {}, returning no-servers", winner);
                        return Err(Error::NoServers);
                    }
                }
            }
            _ => winner.clone(),
        };

        let port = state.topology.port_of(&winner).unwrap_or_default();
        commit(state, &winner, &advertised, min_count);

        return Ok(ChosenHost {
            host: advertised,
            port,
            cluster: state.cluster.clone(),
        });
    }
}

/// Zone lists and load counts to draw candidates from, per mode. `false`
/// pools like `any` when the selector is reached at all.
fn candidate_pool<C>(
    state: &ClusterState<C>,
) -> (HashMap<String, Vec<String>>, HashMap<String, u32>) {
    match state.load_balance {
        LoadBalance::OnlyRr | LoadBalance::PreferRr => (
            state.topology.zones_rr.clone(),
            state.load.read_replica.clone(),
        ),
        LoadBalance::OnlyPrimary | LoadBalance::PreferPrimary => (
            state.topology.zones_primary.clone(),
            state.load.primary.clone(),
        ),
        _ => {
            let mut zones = state.topology.zones_rr.clone();
            for (key, hosts) in &state.topology.zones_primary {
                zones
                    .entry(key.clone())
                    .or_default()
                    .extend(hosts.iter().cloned());
            }
            let mut loads = state.load.read_replica.clone();
            loads.extend(state.load.primary.clone());
            (zones, loads)
        }
    }
}

/// `cloud.region.*` collapses to the `cloud.region` rollup key.
fn rollup(key: &str) -> &str {
    key.strip_suffix(".*").unwrap_or(key)
}

/// Minimum count and the set of hosts tied at it, quarantine filtered.
fn least_loaded<C>(loads: &HashMap<String, u32>, state: &ClusterState<C>) -> (u32, Vec<String>) {
    let mut min_count = u32::MAX;
    let mut winners = Vec::new();
    for (host, count) in loads {
        if is_host_away(state, host) {
            continue;
        }
        match count.cmp(&min_count) {
            Ordering::Less => {
                min_count = *count;
                winners.clear();
                winners.push(host.clone());
            }
            Ordering::Equal => winners.push(host.clone()),
            Ordering::Greater => {}
        }
    }
    (min_count, winners)
}

/// A host is away if it is quarantined, or if it is the public face of a
/// quarantined private host.
fn is_host_away<C>(state: &ClusterState<C>, host: &str) -> bool {
    state.quarantine.keys().any(|away| {
        host == away
            || state
                .topology
                .public_of
                .get(away)
                .is_some_and(|public| public == host)
    })
}

/// Records the choice in the load table. Under public-address substitution
/// the advertised address becomes the key; it counts as primary if either
/// the advertised or the underlying host already lives in the primary map.
fn commit<C>(state: &mut ClusterState<C>, winner: &str, advertised: &str, min_count: u32) {
    if advertised == winner {
        if let Some(count) = state.load.primary.get_mut(winner) {
            *count += 1;
        } else {
            *state
                .load
                .read_replica
                .entry(winner.to_string())
                .or_insert(min_count) += 1;
        }
    } else {
        let in_primary = state.load.primary.contains_key(advertised)
            || state.load.primary.contains_key(winner);
        let map = if in_primary {
            &mut state.load.primary
        } else {
            &mut state.load.read_replica
        };
        *map.entry(advertised.to_string()).or_insert(min_count) += 1;
    }
}
