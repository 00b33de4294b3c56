#![allow(dead_code)]

//! In-memory wire layer for exercising the balancer without a database.
//!
//! Dials and topology queries are scripted: hosts can refuse connections,
//! queries can be made to fail, and established control connections can be
//! severed to force a reopen.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pglb_common::{ConnectConfig, ControlConn, Error, LoadBalance, Result, ServerEntry, Wire};

#[derive(Clone, Default)]
pub struct MockWire {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    servers: Mutex<Vec<ServerEntry>>,
    refuse: Mutex<HashSet<String>>,
    dials: Mutex<Vec<String>>,
    fail_queries: Mutex<u32>,
    generation: AtomicU64,
}

impl MockWire {
    pub fn new(servers: Vec<ServerEntry>) -> Self {
        let wire = MockWire::default();
        wire.set_servers(servers);
        wire
    }

    /// Replaces the `yb_servers()` answer.
    pub fn set_servers(&self, servers: Vec<ServerEntry>) {
        *self.inner.servers.lock().unwrap() = servers;
    }

    /// Makes dials to `host` fail with connection refused.
    pub fn refuse(&self, host: &str) {
        self.inner.refuse.lock().unwrap().insert(host.to_string());
    }

    pub fn allow(&self, host: &str) {
        self.inner.refuse.lock().unwrap().remove(host);
    }

    /// Every dialed host, in order.
    pub fn dials(&self) -> Vec<String> {
        self.inner.dials.lock().unwrap().clone()
    }

    pub fn clear_dials(&self) {
        self.inner.dials.lock().unwrap().clear();
    }

    /// Fails the next `n` topology queries mid-stream.
    pub fn fail_next_queries(&self, n: u32) {
        *self.inner.fail_queries.lock().unwrap() = n;
    }

    /// Severs every established control connection; the next refresh must
    /// dial a fresh one.
    pub fn kill_control_connections(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockConn {
    inner: Arc<Inner>,
    born: u64,
}

#[async_trait]
impl ControlConn for MockConn {
    async fn query_servers(&mut self) -> Result<Vec<ServerEntry>> {
        let mut failures = self.inner.fail_queries.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(Error::Wire(
                "server closed the connection unexpectedly".into(),
            ));
        }
        Ok(self.inner.servers.lock().unwrap().clone())
    }

    fn is_closed(&self) -> bool {
        self.born < self.inner.generation.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Wire for MockWire {
    type Conn = MockConn;

    fn parse_config(&self, conn_string: &str) -> Result<ConnectConfig> {
        // key=value form is all the tests use
        let mut config = ConnectConfig {
            conn_string: conn_string.to_string(),
            ..Default::default()
        };
        for token in conn_string.split_whitespace() {
            if let Some(host) = token.strip_prefix("host=") {
                config.host = host.to_string();
            } else if let Some(port) = token.strip_prefix("port=") {
                config.port = port
                    .parse()
                    .map_err(|_| Error::Validation(format!("bad port '{port}'")))?;
            }
        }
        Ok(config)
    }

    async fn connect(&self, config: &ConnectConfig) -> Result<MockConn> {
        self.inner.dials.lock().unwrap().push(config.host.clone());
        if self.inner.refuse.lock().unwrap().contains(&config.host) {
            return Err(Error::Wire(format!("connection refused: {}", config.host)));
        }
        Ok(MockConn {
            inner: Arc::clone(&self.inner),
            born: self.inner.generation.load(Ordering::SeqCst),
        })
    }
}

pub fn primary(host: &str, zone: &str) -> ServerEntry {
    ServerEntry {
        host: host.to_string(),
        port: 5433,
        num_connections: 0,
        node_type: "primary".to_string(),
        cloud: "aws".to_string(),
        region: "us-east".to_string(),
        zone: zone.to_string(),
        public_ip: String::new(),
    }
}

pub fn replica(host: &str, zone: &str) -> ServerEntry {
    ServerEntry {
        node_type: "read_replica".to_string(),
        ..primary(host, zone)
    }
}

pub fn with_public(mut entry: ServerEntry, public_ip: &str) -> ServerEntry {
    entry.public_ip = public_ip.to_string();
    entry
}

/// Config for a seed with balancing on and refresh forced every request.
pub fn balanced_config(seed: &str) -> ConnectConfig {
    let mut config = ConnectConfig::new(seed, 5433);
    config.conn_string = format!("host={seed} port=5433 dbname=app user=app");
    config.load_balance = LoadBalance::Any;
    config
}
