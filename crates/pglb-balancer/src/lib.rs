//! pglb Balancer
//!
//! This crate is the brain of the pglb connection balancer: a serialized
//! coordinator that owns per-cluster load tables, refreshes an
//! eventually-consistent topology view over a control connection, and picks
//! the least-loaded host permitted by the caller's topology preferences.
//!
//! # Architecture
//!
//! ```text
//! caller ──AcquireRequest──▶ Balancer handle ──mpsc──▶ coordinator task
//!                                                        │  refresh topology if stale
//!                                                        │  (control connection,
//!                                                        │   failover on error)
//!                                                        │  run selector, commit count
//! caller ◀──ChosenHost / error──── oneshot reply ◀───────┘
//! ```
//!
//! All cluster state lives inside the single coordinator task; there are no
//! locks. Callers observe a strict request/reply discipline, and the
//! decrement a caller sends after a failed dial is ordered before its
//! re-request, so the next selection always sees the corrected count.
//!
//! # Key Behaviors
//!
//! - **Least-loaded selection**: counts are per-process, split primary vs
//!   read replica, tie-broken uniformly at random.
//! - **Topology preferences**: ordered tiers of `cloud.region.zone` keys,
//!   with `cloud.region.*` rollups; a tier with any available host wins.
//! - **Quarantine**: hosts that fail to connect sit out selection until a
//!   configurable reconnect delay passes.
//! - **Control failover**: the topology query self-heals by quarantining a
//!   failed control host and reconnecting to an alternate from the previous
//!   snapshot, bounded by the candidate count.

pub mod cluster;
pub mod coordinator;
pub mod load;
pub mod topology;

mod control;
mod selector;

pub use cluster::AddressMode;
pub use coordinator::{AcquireRequest, Balancer, ChosenHost};
pub use load::{HostLoad, Quarantine};
pub use topology::Topology;
