//! Per-cluster state owned by the coordinator task.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use pglb_common::{ConnectConfig, LoadBalance};
use tracing::warn;

use crate::load::{HostLoad, Quarantine};
use crate::topology::Topology;

/// Which address form selection advertises for this cluster.
///
/// Inferred once after the first refresh from where the seed address
/// appears in the topology, then only advanced `TryBoth -> Exhausted` when
/// every private address has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// Advertise private addresses.
    UseHosts,
    /// Advertise public addresses.
    UsePublicIp,
    /// Seed matched neither side; try private first.
    TryBoth,
    /// Private addresses exhausted under `TryBoth`; advertise public ones.
    Exhausted,
}

/// All state for one cluster, keyed by the resolved seed address.
///
/// Created lazily on the first request for a seed and never evicted. Only
/// the coordinator task touches it, which is the sole synchronization
/// mechanism for the maps inside.
pub(crate) struct ClusterState<C> {
    pub(crate) cluster: String,
    /// Connection string refresh re-parses to open control connections;
    /// overwritten by the newest caller and by control failover.
    pub(crate) conn_string: String,

    // Mutable policy, newest caller wins.
    pub(crate) load_balance: LoadBalance,
    pub(crate) topology_keys: Option<Vec<Vec<String>>>,
    pub(crate) fallback_to_topology_keys_only: bool,
    pub(crate) failed_host_reconnect_delay: Duration,
    pub(crate) refresh_interval: Duration,

    pub(crate) topology: Topology,
    pub(crate) load: HostLoad,
    pub(crate) quarantine: Quarantine,
    pub(crate) mode: AddressMode,
    pub(crate) last_refresh: Option<Instant>,
    pub(crate) control: Option<C>,
    pub(crate) control_host: String,
}

impl<C> ClusterState<C> {
    pub(crate) fn new(cluster: String, config: &ConnectConfig) -> Self {
        Self {
            cluster,
            conn_string: config.conn_string.clone(),
            load_balance: config.load_balance,
            topology_keys: config.topology_keys.clone(),
            fallback_to_topology_keys_only: config.fallback_to_topology_keys_only,
            failed_host_reconnect_delay: config.failed_host_reconnect_delay,
            refresh_interval: config.refresh_interval,
            topology: Topology::default(),
            load: HostLoad::default(),
            quarantine: Quarantine::default(),
            mode: AddressMode::UseHosts,
            last_refresh: None,
            control: None,
            control_host: String::new(),
        }
    }

    /// Overwrites the mutable policy fields from an incoming request. The
    /// refresh interval is fixed at cluster creation and not part of this.
    pub(crate) fn update_policy(&mut self, config: &ConnectConfig) {
        self.topology_keys = config.topology_keys.clone();
        self.fallback_to_topology_keys_only = config.fallback_to_topology_keys_only;
        self.failed_host_reconnect_delay = config.failed_host_reconnect_delay;
        self.load_balance = config.load_balance;
        self.conn_string = config.conn_string.clone();
    }

    pub(crate) fn merge_unavailable(&mut self, hosts: HashMap<String, Instant>) {
        self.quarantine.merge(hosts);
    }

    pub(crate) fn is_stale(&self) -> bool {
        match self.last_refresh {
            Some(at) => at.elapsed() > self.refresh_interval,
            None => true,
        }
    }

    /// Infers the address mode after the first refresh.
    ///
    /// Seed equal to a private host selects private addresses; equal to a
    /// public address selects public ones; otherwise both are tried. With
    /// no public address anywhere in the cluster, private addresses are the
    /// only option regardless.
    pub(crate) fn infer_mode(&mut self) {
        let public_available = self.topology.public_of.values().any(|p| !p.is_empty());
        self.mode = if !public_available || self.topology.public_of.contains_key(&self.cluster) {
            AddressMode::UseHosts
        } else if self.topology.public_of.values().any(|p| p == &self.cluster) {
            AddressMode::UsePublicIp
        } else {
            AddressMode::TryBoth
        };
    }

    /// Quarantines a host that failed to connect and removes it from the
    /// active maps so selection and control failover skip it.
    pub(crate) fn mark_host_away(&mut self, host: &str) {
        warn!("marking host {} as unreachable", host);
        self.load.remove(host);
        self.topology.public_of.remove(host);
        self.quarantine.mark(host);
    }

    /// Re-admits quarantined hosts older than the reconnect delay, at
    /// count zero in whichever role map the latest snapshot put them.
    pub(crate) fn age_out_quarantine(&mut self) {
        for host in self.quarantine.expired(self.failed_host_reconnect_delay) {
            tracing::info!("removing {} from unavailable host list", host);
            if let Some(count) = self.load.primary.get_mut(&host) {
                *count = 0;
            } else if let Some(count) = self.load.read_replica.get_mut(&host) {
                *count = 0;
            }
            self.quarantine.remove(&host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_topology(seed: &str, entries: &[(&str, &str)]) -> ClusterState<()> {
        let config = ConnectConfig::new(seed, 5433);
        let mut state = ClusterState::new(seed.to_string(), &config);
        for (host, public) in entries {
            state
                .topology
                .add_server(host, 5433, public, true, "aws", "us-east", "1a");
        }
        state
    }

    #[test]
    fn test_mode_seed_matches_private_host() {
        let mut state = state_with_topology(
            "10.0.0.1",
            &[("10.0.0.1", "198.51.100.1"), ("10.0.0.2", "198.51.100.2")],
        );
        state.infer_mode();
        assert_eq!(state.mode, AddressMode::UseHosts);
    }

    #[test]
    fn test_mode_seed_matches_public_address() {
        let mut state = state_with_topology(
            "198.51.100.2",
            &[("10.0.0.1", "198.51.100.1"), ("10.0.0.2", "198.51.100.2")],
        );
        state.infer_mode();
        assert_eq!(state.mode, AddressMode::UsePublicIp);
    }

    #[test]
    fn test_mode_seed_matches_neither() {
        let mut state = state_with_topology("203.0.113.9", &[("10.0.0.1", "198.51.100.1")]);
        state.infer_mode();
        assert_eq!(state.mode, AddressMode::TryBoth);
    }

    #[test]
    fn test_mode_forced_private_without_public_ips() {
        let mut state = state_with_topology("203.0.113.9", &[("10.0.0.1", ""), ("10.0.0.2", "")]);
        state.infer_mode();
        assert_eq!(state.mode, AddressMode::UseHosts);
    }

    #[test]
    fn test_mark_host_away() {
        let mut state = state_with_topology("10.0.0.1", &[("10.0.0.1", ""), ("10.0.0.2", "")]);
        state.load.primary.insert("10.0.0.2".into(), 4);

        state.mark_host_away("10.0.0.2");

        assert!(state.quarantine.contains("10.0.0.2"));
        assert_eq!(state.load.count("10.0.0.2"), None);
        assert!(state.topology.public_of("10.0.0.2").is_none());
        // port survives so control failover can still rewrite to it later
        assert_eq!(state.topology.port_of("10.0.0.2"), Some(5433));
    }

    #[test]
    fn test_age_out_restores_at_zero() {
        let mut state = state_with_topology("10.0.0.1", &[("10.0.0.1", ""), ("10.0.0.2", "")]);
        state.failed_host_reconnect_delay = Duration::from_secs(5);
        state.load.primary.insert("10.0.0.2".into(), 7);
        state
            .quarantine
            .mark_at("10.0.0.2", Instant::now() - Duration::from_secs(6));
        state.quarantine.mark_at("10.0.0.1", Instant::now());

        state.age_out_quarantine();

        assert!(!state.quarantine.contains("10.0.0.2"));
        assert_eq!(state.load.count("10.0.0.2"), Some(0));
        assert!(state.quarantine.contains("10.0.0.1"));
    }

    #[test]
    fn test_staleness() {
        let config = ConnectConfig::new("10.0.0.1", 5433);
        let mut state: ClusterState<()> = ClusterState::new("10.0.0.1".into(), &config);
        assert!(state.is_stale());
        state.last_refresh = Some(Instant::now());
        assert!(!state.is_stale());
        state.refresh_interval = Duration::from_secs(0);
        state.last_refresh = Some(Instant::now() - Duration::from_millis(10));
        assert!(state.is_stale());
    }
}
