//! Wire-layer trait seams.
//!
//! The balancer never speaks the PostgreSQL wire protocol itself. The
//! embedding driver implements [`Wire`] (config parsing and dialing) and
//! [`ControlConn`] (the topology query on an established connection), and
//! the balancer drives everything through these two traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ConnectConfig;
use crate::error::Result;

/// The topology query a [`ControlConn`] implementation must issue.
pub const SERVERS_QUERY: &str =
    "SELECT host,port,num_connections,node_type,cloud,region,zone,public_ip FROM yb_servers()";

/// One row of the `yb_servers()` system view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub host: String,
    pub port: u16,
    /// Server-side connection count; advisory only, the balancer tracks its
    /// own per-process counts.
    pub num_connections: i64,
    /// `"primary"` or anything else, which classifies as read replica.
    pub node_type: String,
    pub cloud: String,
    pub region: String,
    pub zone: String,
    /// May be empty when the node has no public address.
    pub public_ip: String,
}

impl ServerEntry {
    pub fn is_primary(&self) -> bool {
        self.node_type == "primary"
    }
}

/// An established connection that can run the topology query.
///
/// A query, row-scan, or end-of-stream failure all surface as the `Err` of
/// [`ControlConn::query_servers`]; the balancer reacts identically to each
/// by quarantining the control host and failing over.
#[async_trait]
pub trait ControlConn: Send {
    /// Runs [`SERVERS_QUERY`] and returns every row.
    async fn query_servers(&mut self) -> Result<Vec<ServerEntry>>;

    /// Whether the underlying connection is known to be dead.
    fn is_closed(&self) -> bool;
}

/// The dialing side of the wire layer.
#[async_trait]
pub trait Wire: Send + Sync + 'static {
    type Conn: ControlConn + 'static;

    /// Parses a connection string into a config.
    fn parse_config(&self, conn_string: &str) -> Result<ConnectConfig>;

    /// Dials the endpoint named by `config`.
    async fn connect(&self, config: &ConnectConfig) -> Result<Self::Conn>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_classification() {
        let mut entry = ServerEntry {
            host: "10.0.0.1".into(),
            port: 5433,
            num_connections: 0,
            node_type: "primary".into(),
            cloud: "aws".into(),
            region: "us-east".into(),
            zone: "1a".into(),
            public_ip: String::new(),
        };
        assert!(entry.is_primary());
        entry.node_type = "read_replica".into();
        assert!(!entry.is_primary());
    }

    #[test]
    fn test_server_entry_round_trips_json() {
        let entry = ServerEntry {
            host: "10.0.0.2".into(),
            port: 5433,
            num_connections: 7,
            node_type: "read_replica".into(),
            cloud: "gcp".into(),
            region: "us-central1".into(),
            zone: "c".into(),
            public_ip: "198.51.100.2".into(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: ServerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
