//! Per-refresh topology snapshot.
//!
//! Rebuilt from scratch on every successful control query and swapped in
//! atomically; nothing mutates a snapshot between refreshes except the
//! removal of hosts quarantined by a failed control dial.

use std::collections::HashMap;

/// Cluster view keyed by canonical (resolved) private host address.
///
/// Every host appears in the zone lists twice: under its exact
/// `cloud.region.zone` key and under the `cloud.region` rollup used by
/// `cloud.region.*` topology keys.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// host -> port
    pub(crate) port_of: HashMap<String, u16>,
    /// host -> public address; empty string when the node has none. Also
    /// serves as the set of known hosts for control-connection failover.
    pub(crate) public_of: HashMap<String, String>,
    /// zone key -> primary hosts
    pub(crate) zones_primary: HashMap<String, Vec<String>>,
    /// zone key -> read-replica hosts
    pub(crate) zones_rr: HashMap<String, Vec<String>>,
}

impl Topology {
    /// Records one server row under its role, exact zone, and region rollup.
    pub fn add_server(
        &mut self,
        host: &str,
        port: u16,
        public: &str,
        primary: bool,
        cloud: &str,
        region: &str,
        zone: &str,
    ) {
        self.port_of.insert(host.to_string(), port);
        self.public_of.insert(host.to_string(), public.to_string());

        let zone_key = format!("{cloud}.{region}.{zone}");
        let region_key = format!("{cloud}.{region}");
        let zones = if primary {
            &mut self.zones_primary
        } else {
            &mut self.zones_rr
        };
        zones.entry(zone_key).or_default().push(host.to_string());
        zones.entry(region_key).or_default().push(host.to_string());
    }

    pub fn port_of(&self, host: &str) -> Option<u16> {
        self.port_of.get(host).copied()
    }

    pub fn public_of(&self, host: &str) -> Option<&str> {
        self.public_of.get(host).map(String::as_str)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &String> {
        self.public_of.keys()
    }

    pub fn host_count(&self) -> usize {
        self.public_of.len()
    }
}
