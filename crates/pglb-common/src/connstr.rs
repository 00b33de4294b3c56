//! Connection-string host/port rewriting.
//!
//! The wire layer dials whatever the connection string names, so routing a
//! connection to the balancer's chosen node means rewriting the host and
//! port tokens in place. Pure function of the input string and the target.

use once_cell::sync::Lazy;
use regex::Regex;

static URI_USERINFO_HOST: Lazy<Regex> = Lazy::new(|| Regex::new("@([^/]*)/").expect("static pattern"));
static URI_HOST: Lazy<Regex> = Lazy::new(|| Regex::new("://([^/]*)/").expect("static pattern"));
static DSN_HOST: Lazy<Regex> = Lazy::new(|| Regex::new("host=([^ ]*) ").expect("static pattern"));
static DSN_PORT: Lazy<Regex> = Lazy::new(|| Regex::new("port=([^ ]*) ").expect("static pattern"));

/// Rewrites the endpoint of a connection string to `host:port`.
///
/// Handles both URI (`postgres://`, `postgresql://`) and key=value forms.
/// In URI form the authority between the scheme (or userinfo `@`) and the
/// first `/` is replaced wholesale; in key=value form the space-delimited
/// `host=` and `port=` tokens are replaced.
///
/// ```
/// use pglb_common::connstr::replace_host_port;
///
/// assert_eq!(
///     replace_host_port("postgres://user:pw@10.0.0.1:5433/app", "10.0.0.2", 5433),
///     "postgres://user:pw@10.0.0.2:5433/app"
/// );
/// assert_eq!(
///     replace_host_port("host=10.0.0.1 port=5433 dbname=app", "10.0.0.3", 5434),
///     "host=10.0.0.3 port=5434 dbname=app"
/// );
/// ```
// TODO: bracketed IPv6 literals in URI form are not rewritten correctly.
pub fn replace_host_port(conn_string: &str, host: &str, port: u16) -> String {
    if conn_string.starts_with("postgres://") || conn_string.starts_with("postgresql://") {
        if conn_string.contains('@') {
            URI_USERINFO_HOST
                .replace_all(conn_string, format!("@{host}:{port}/").as_str())
                .into_owned()
        } else {
            URI_HOST
                .replace_all(conn_string, format!("://{host}:{port}/").as_str())
                .into_owned()
        }
    } else {
        let rewritten = DSN_HOST.replace_all(conn_string, format!("host={host} ").as_str());
        DSN_PORT
            .replace_all(&rewritten, format!("port={port} ").as_str())
            .into_owned()
    }
}
