//! Per-host connection counters and the quarantine of failed hosts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Connection counts opened through this process, split by node role.
///
/// Keys are canonical host addresses; under public-address substitution the
/// advertised public address becomes the key (the selector's commit rule).
#[derive(Debug, Clone, Default)]
pub struct HostLoad {
    pub(crate) primary: HashMap<String, u32>,
    pub(crate) read_replica: HashMap<String, u32>,
}

impl HostLoad {
    /// Decrements whichever role map contains the host, floored at zero.
    /// Returns false when the host is in neither map.
    pub fn decrement(&mut self, host: &str) -> bool {
        if let Some(count) = self.primary.get_mut(host) {
            *count = count.saturating_sub(1);
            true
        } else if let Some(count) = self.read_replica.get_mut(host) {
            *count = count.saturating_sub(1);
            true
        } else {
            false
        }
    }

    /// Drops the host from both role maps.
    pub fn remove(&mut self, host: &str) {
        self.primary.remove(host);
        self.read_replica.remove(host);
    }

    /// Count carried forward into a fresh snapshot; zero for new hosts.
    pub fn carried(&self, host: &str, primary: bool) -> u32 {
        let map = if primary { &self.primary } else { &self.read_replica };
        map.get(host).copied().unwrap_or(0)
    }

    pub fn count(&self, host: &str) -> Option<u32> {
        self.primary
            .get(host)
            .or_else(|| self.read_replica.get(host))
            .copied()
    }

    /// Both role maps merged, for introspection.
    pub fn merged(&self) -> HashMap<String, u32> {
        let mut merged = self.primary.clone();
        merged.extend(self.read_replica.clone());
        merged
    }

    pub fn clear(&mut self) {
        self.primary.clear();
        self.read_replica.clear();
    }
}

/// Hosts that failed to connect, stamped with the failure time.
#[derive(Debug, Clone, Default)]
pub struct Quarantine {
    hosts: HashMap<String, Instant>,
}

impl Quarantine {
    pub fn mark(&mut self, host: &str) {
        self.mark_at(host, Instant::now());
    }

    pub fn mark_at(&mut self, host: &str, at: Instant) {
        self.hosts.insert(host.to_string(), at);
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains_key(host)
    }

    pub fn remove(&mut self, host: &str) {
        self.hosts.remove(host);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.hosts.keys()
    }

    /// Hosts quarantined strictly longer than `delay` ago.
    pub fn expired(&self, delay: Duration) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|(_, at)| at.elapsed() > delay)
            .map(|(host, _)| host.clone())
            .collect()
    }

    pub fn merge(&mut self, hosts: HashMap<String, Instant>) {
        self.hosts.extend(hosts);
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
