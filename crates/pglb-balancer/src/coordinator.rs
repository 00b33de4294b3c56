//! The serialized coordinator and its public handle.
//!
//! One spawned task owns every cluster's load table; callers talk to it
//! over a single command channel and block on a oneshot reply. That
//! serialization is the only synchronization the maps need: requests are
//! totally ordered by arrival, and a decrement sent before a re-request is
//! observed before the next selection.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use pglb_common::{resolve_host, ConnectConfig, Error, Result, Wire};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::cluster::ClusterState;
use crate::control::refresh;
use crate::selector::select_host;

/// The endpoint selection returned for one connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChosenHost {
    /// Address to dial; a public address under public-IP substitution.
    pub host: String,
    pub port: u16,
    /// Cluster key to echo back when decrementing after a failed dial.
    pub cluster: String,
}

/// One connection request to the balancer.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    /// The caller's parsed config. Policy fields overwrite the stored
    /// cluster policy: the newest caller wins.
    pub config: ConnectConfig,
    /// Hosts the caller wants quarantined, stamped with failure time.
    pub unavailable: HashMap<String, Instant>,
}

impl AcquireRequest {
    pub fn new(config: ConnectConfig) -> Self {
        Self {
            config,
            unavailable: HashMap::new(),
        }
    }
}

enum Command {
    Acquire {
        request: AcquireRequest,
        reply: oneshot::Sender<Result<ChosenHost>>,
    },
    Decrement {
        cluster: String,
        host: String,
    },
    // Test-only introspection of the internal tables.
    HostLoad {
        reply: oneshot::Sender<HashMap<String, HashMap<String, u32>>>,
    },
    ZoneHosts {
        reply: oneshot::Sender<HashMap<String, HashMap<String, Vec<String>>>>,
    },
    ClearHostLoad,
}

/// Cheap-to-clone handle to the coordinator task.
///
/// Create one per process with [`Balancer::spawn`] and share it; every
/// clone talks to the same serializer and therefore the same load tables.
#[derive(Clone)]
pub struct Balancer {
    commands: mpsc::Sender<Command>,
}

impl Balancer {
    /// Spawns the coordinator task for the given wire layer.
    pub fn spawn<W: Wire>(wire: W) -> Self {
        let (commands, inbox) = mpsc::channel(32);
        let coordinator = Coordinator {
            wire,
            clusters: HashMap::new(),
        };
        tokio::spawn(coordinator.run(inbox));
        Balancer { commands }
    }

    /// Asks the coordinator for the least-loaded permitted host.
    pub async fn acquire(&self, request: AcquireRequest) -> Result<ChosenHost> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Acquire { request, reply })
            .await
            .map_err(|_| Error::Internal("balancer task is gone".into()))?;
        response
            .await
            .map_err(|_| Error::Internal("balancer dropped the request".into()))?
    }

    /// Gives back one connection count for a host that failed or closed.
    /// Best-effort: delivery is awaited, the effect is not.
    pub async fn decrement(&self, cluster: &str, host: &str) {
        let _ = self
            .commands
            .send(Command::Decrement {
                cluster: cluster.to_string(),
                host: host.to_string(),
            })
            .await;
    }

    /// Test support: per-cluster merged connection counts.
    pub async fn host_load(&self) -> HashMap<String, HashMap<String, u32>> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::HostLoad { reply }).await.is_err() {
            return HashMap::new();
        }
        response.await.unwrap_or_default()
    }

    /// Test support: per-cluster zone-to-hosts lists (exact zones only).
    pub async fn zone_hosts(&self) -> HashMap<String, HashMap<String, Vec<String>>> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::ZoneHosts { reply }).await.is_err() {
            return HashMap::new();
        }
        response.await.unwrap_or_default()
    }

    /// Test support: wipes every cluster's connection counts.
    pub async fn clear_host_load(&self) {
        let _ = self.commands.send(Command::ClearHostLoad).await;
    }
}

struct Coordinator<W: Wire> {
    wire: W,
    clusters: HashMap<String, ClusterState<W::Conn>>,
}

impl<W: Wire> Coordinator<W> {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        while let Some(command) = inbox.recv().await {
            match command {
                Command::Acquire { request, reply } => {
                    let result = self.acquire(request).await;
                    let _ = reply.send(result);
                }
                Command::Decrement { cluster, host } => self.decrement(&cluster, &host),
                Command::HostLoad { reply } => {
                    let _ = reply.send(self.host_load());
                }
                Command::ZoneHosts { reply } => {
                    let _ = reply.send(self.zone_hosts());
                }
                Command::ClearHostLoad => {
                    for state in self.clusters.values_mut() {
                        state.load.clear();
                    }
                }
            }
        }
        warn!("balancer command channel closed, coordinator exiting");
    }

    async fn acquire(&mut self, request: AcquireRequest) -> Result<ChosenHost> {
        let cluster = resolve_host(&request.config.host).await;
        match self.clusters.entry(cluster.clone()) {
            Entry::Vacant(slot) => {
                let mut state = ClusterState::new(cluster, &request.config);
                refresh(&self.wire, &mut state).await?;
                state.infer_mode();
                state.merge_unavailable(request.unavailable);
                select_host(slot.insert(state))
            }
            Entry::Occupied(slot) => {
                let state = slot.into_mut();
                state.update_policy(&request.config);
                if state.is_stale() {
                    refresh(&self.wire, state).await?;
                }
                // merged after refresh so age-out cannot resurrect a host
                // the caller just failed against
                state.merge_unavailable(request.unavailable);
                select_host(state)
            }
        }
    }

    fn decrement(&mut self, cluster: &str, host: &str) {
        match self.clusters.get_mut(cluster) {
            Some(state) => {
                state.load.decrement(host);
            }
            None => warn!("cannot update connection count, unknown cluster {}", cluster),
        }
    }

    fn host_load(&self) -> HashMap<String, HashMap<String, u32>> {
        self.clusters
            .iter()
            .map(|(cluster, state)| (cluster.clone(), state.load.merged()))
            .collect()
    }

    fn zone_hosts(&self) -> HashMap<String, HashMap<String, Vec<String>>> {
        let mut all = HashMap::new();
        for (cluster, state) in &self.clusters {
            let mut zones: HashMap<String, Vec<String>> = HashMap::new();
            for (key, hosts) in state
                .topology
                .zones_primary
                .iter()
                .chain(state.topology.zones_rr.iter())
            {
                // region rollup keys are an indexing detail, not topology
                if key.split('.').count() == 3 {
                    zones.entry(key.clone()).or_default().extend(hosts.clone());
                }
            }
            all.insert(cluster.clone(), zones);
        }
        all
    }
}
