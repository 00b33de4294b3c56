//! Connection configuration and balancer option validation.
//!
//! The embedding driver parses the connection string; this module owns the
//! balancer-specific options carried on it: the load-balance mode, the
//! ordered topology-key preference tiers, and the refresh/quarantine
//! timing knobs with their documented defaults and ceilings.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default gap between topology refreshes.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
/// Ceiling for the refresh interval option.
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 600;
/// Default time a failed host stays quarantined.
pub const DEFAULT_FAILED_HOST_RECONNECT_DELAY_SECS: u64 = 5;
/// Ceiling for the failed-host reconnect delay option.
pub const MAX_FAILED_HOST_RECONNECT_DELAY_SECS: u64 = 60;

/// Clamps a refresh-interval option value to its ceiling.
pub fn clamp_refresh_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.min(MAX_REFRESH_INTERVAL_SECS))
}

/// Clamps a failed-host reconnect delay to its ceiling.
pub fn clamp_reconnect_delay(secs: u64) -> Duration {
    Duration::from_secs(secs.min(MAX_FAILED_HOST_RECONNECT_DELAY_SECS))
}

/// Candidate-pool selection mode for the balancer.
///
/// `False` disables balancing at the driver entry point; if the selector is
/// handed a `False` config anyway it pools like [`LoadBalance::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalance {
    #[default]
    False,
    /// `true` and `any` both land here: primaries and read replicas.
    Any,
    OnlyRr,
    OnlyPrimary,
    PreferRr,
    PreferPrimary,
}

impl LoadBalance {
    /// Whether the balancer should be engaged at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, LoadBalance::False)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalance::False => "false",
            LoadBalance::Any => "any",
            LoadBalance::OnlyRr => "only-rr",
            LoadBalance::OnlyPrimary => "only-primary",
            LoadBalance::PreferRr => "prefer-rr",
            LoadBalance::PreferPrimary => "prefer-primary",
        }
    }
}

impl std::fmt::Display for LoadBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "false" => Ok(LoadBalance::False),
            "true" | "any" => Ok(LoadBalance::Any),
            "only-rr" => Ok(LoadBalance::OnlyRr),
            "only-primary" => Ok(LoadBalance::OnlyPrimary),
            "prefer-rr" => Ok(LoadBalance::PreferRr),
            "prefer-primary" => Ok(LoadBalance::PreferPrimary),
            other => Err(Error::Validation(format!(
                "load_balance '{other}' is not one of true, false, any, only-rr, only-primary, prefer-rr, prefer-primary"
            ))),
        }
    }
}

/// Parses a topology-keys option into ordered preference tiers.
///
/// Tiers are colon-separated; keys within a tier are comma-separated. Every
/// key must have exactly three non-empty dot-separated parts; the zone part
/// may be `*` to mean the whole region.
///
/// ```
/// use pglb_common::config::parse_topology_keys;
///
/// let tiers = parse_topology_keys("aws.us-east.1a,aws.us-east.1b:aws.us-west.*").unwrap();
/// assert_eq!(tiers.len(), 2);
/// assert_eq!(tiers[0], vec!["aws.us-east.1a", "aws.us-east.1b"]);
/// assert!(parse_topology_keys("aws.us-east").is_err());
/// ```
pub fn parse_topology_keys(raw: &str) -> Result<Vec<Vec<String>>> {
    let mut tiers = Vec::new();
    for tier in raw.split(':') {
        let mut keys = Vec::new();
        for key in tier.split(',') {
            let parts: Vec<&str> = key.split('.').collect();
            if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
                return Err(Error::Validation(format!(
                    "topology_keys '{raw}' not in correct format, keys should be specified as '<cloud>.<region>.<zone>'"
                )));
            }
            keys.push(key.to_string());
        }
        tiers.push(keys);
    }
    Ok(tiers)
}

/// A fallback endpoint from a multi-host connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

/// A parsed connection configuration.
///
/// The wire layer produces one of these from a connection string; the
/// balancer only ever reads it or derives rewritten copies. The caller's
/// config is never mutated.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    /// Remaining endpoints of a multi-host connection string. The balancer
    /// drives failover itself and discards all but the first of these when
    /// it redials.
    pub fallbacks: Vec<HostPort>,
    /// The connection string this config was parsed from.
    pub conn_string: String,
    /// Overall dial budget; `None` means unbounded.
    pub connect_timeout: Option<Duration>,

    pub load_balance: LoadBalance,
    /// Ordered preference tiers from `topology_keys`, outer = tier.
    pub topology_keys: Option<Vec<Vec<String>>>,
    /// When true and every tier is exhausted, fail with the
    /// fallback-to-original sentinel instead of widening the pool.
    pub fallback_to_topology_keys_only: bool,
    pub failed_host_reconnect_delay: Duration,
    pub refresh_interval: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5433,
            fallbacks: Vec::new(),
            conn_string: String::new(),
            connect_timeout: None,
            load_balance: LoadBalance::False,
            topology_keys: None,
            fallback_to_topology_keys_only: false,
            failed_host_reconnect_delay: Duration::from_secs(
                DEFAULT_FAILED_HOST_RECONNECT_DELAY_SECS,
            ),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
        }
    }
}

impl ConnectConfig {
    /// Config for a single seed endpoint, everything else at defaults.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Applies one recognized balancer option parsed off a connection
    /// string. Unknown keys and malformed values are validation errors.
    pub fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "load_balance" => {
                self.load_balance = value.parse()?;
            }
            "topology_keys" => {
                self.topology_keys = Some(parse_topology_keys(value)?);
            }
            "fallback_to_topology_keys_only" => {
                self.fallback_to_topology_keys_only = match value {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(Error::Validation(format!(
                            "fallback_to_topology_keys_only '{other}' is not a boolean"
                        )))
                    }
                };
            }
            "failed_host_reconnect_delay_secs" => {
                let secs: u64 = value.parse().map_err(|_| {
                    Error::Validation(format!(
                        "failed_host_reconnect_delay_secs '{value}' is not an integer"
                    ))
                })?;
                self.failed_host_reconnect_delay = clamp_reconnect_delay(secs);
            }
            "refresh_interval" => {
                let secs: u64 = value.parse().map_err(|_| {
                    Error::Validation(format!("refresh_interval '{value}' is not an integer"))
                })?;
                self.refresh_interval = clamp_refresh_interval(secs);
            }
            other => {
                return Err(Error::Validation(format!(
                    "unrecognized balancer option '{other}'"
                )))
            }
        }
        Ok(())
    }

    /// Applies a set of options, e.g. the query parameters of a URI.
    pub fn apply_options<'a>(
        &mut self,
        options: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<()> {
        for (key, value) in options {
            self.apply_option(key, value)?;
        }
        Ok(())
    }
}
