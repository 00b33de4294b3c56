use thiserror::Error;

/// Result alias used across the pglb crates.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The selector found no candidate host at all.
    #[error("could not find a server to connect to")]
    NoServers,

    /// Sentinel: every preferred tier is exhausted and the caller asked not
    /// to widen beyond the topology keys. Callers should retry without the
    /// balancer.
    #[error("no preferred server available, fallback-to-topology-keys-only is set to true")]
    FallbackToOriginal,

    /// Malformed topology keys or an unrecognized option value.
    #[error("invalid connection option: {0}")]
    Validation(String),

    /// A dial or control query exceeded its deadline.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// Failure surfaced verbatim from the wire layer: DNS, dial, query, or
    /// row-scan errors.
    #[error("{0}")]
    Wire(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wraps a wire-layer failure, preserving its message verbatim.
    pub fn wire(err: impl std::fmt::Display) -> Self {
        Error::Wire(err.to_string())
    }

    /// True for the sentinel instructing callers to retry without the
    /// balancer.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Error::FallbackToOriginal)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Wire(err.to_string())
    }
}
