//! pglb Driver
//!
//! Caller-side entry point of the pglb connection balancer. Given a parsed
//! connection config whose `load_balance` option is enabled,
//! [`connect_load_balanced`] asks the balancer for the least-loaded
//! permitted host, rewrites the connection string so the unmodified wire
//! layer dials that node, and retries against alternates when a dial
//! fails, giving the failed host's count back and quarantining it each
//! time.
//!
//! # Fallback Semantics
//!
//! - The fallback-to-original sentinel is returned as-is so the embedding
//!   driver can retry the caller's original connection string without the
//!   balancer.
//! - Any other balancer failure degrades transparently to a direct dial of
//!   the original config.

pub mod connect;

pub use connect::{connect_load_balanced, MAX_RETRIES};
