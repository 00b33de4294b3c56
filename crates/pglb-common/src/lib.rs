//! pglb Common Types
//!
//! This crate provides the shared types for the pglb cluster-aware
//! connection balancer: error handling, connection configuration, the
//! topology-row protocol type, and the wire-layer trait seams.
//!
//! # Overview
//!
//! pglb is the load-balancing core of a PostgreSQL-wire-compatible client
//! driver for distributed database clusters that expose a `yb_servers()`
//! system view. The balancer routes every new connection to the live node
//! that is permitted by topology preferences and currently least loaded by
//! connections opened through this process.
//!
//! This crate deliberately contains no networking: the PostgreSQL wire
//! protocol lives behind the [`wire::Wire`] and [`wire::ControlConn`]
//! traits, which the embedding driver implements.
//!
//! # Components
//!
//! - [`error`] - The [`Error`] enum and crate-wide [`Result`] alias
//! - [`config`] - [`ConnectConfig`], the [`LoadBalance`] mode, topology-key
//!   validation, and option clamping
//! - [`wire`] - [`ServerEntry`] rows, the topology query text, and the
//!   wire-layer traits
//! - [`dns`] - canonical host resolution
//! - [`connstr`] - connection-string host/port rewriting

pub mod config;
pub mod connstr;
pub mod dns;
pub mod error;
pub mod wire;

pub use config::{ConnectConfig, HostPort, LoadBalance};
pub use connstr::replace_host_port;
pub use dns::resolve_host;
pub use error::{Error, Result};
pub use wire::{ControlConn, ServerEntry, Wire, SERVERS_QUERY};
