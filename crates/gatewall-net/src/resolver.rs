//! Reverse-DNS resolution and hostname pattern matching
//!
//! Resolution maps a remote address back to its canonical name so policy
//! can require connections to arrive through an approved domain. Every
//! failure mode (lookup error, timeout, unparseable address) fails the
//! hostname check closed.

use std::fmt;
use std::net::IpAddr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Ceiling on how long a single reverse lookup may block the calling
/// worker. The platform resolver has no timeout of its own.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reverse-lookup failures. All of them fail the hostname check closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The platform resolver returned an error.
    Lookup(String),
    /// The lookup exceeded the configured timeout.
    TimedOut,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup(detail) => write!(f, "reverse lookup failed: {detail}"),
            Self::TimedOut => write!(f, "reverse lookup timed out"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Resolves a network address to its canonical hostname.
///
/// The engine only sees this trait, so tests substitute a fixed table and
/// hosts can plug in their own resolver stack.
pub trait ReverseResolver: Send + Sync {
    fn resolve(&self, address: IpAddr) -> Result<String, ResolveError>;
}

/// System resolver: blocking PTR lookup on a helper thread, bounded by a
/// timeout so a stalled resolver cannot stall the calling worker.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_TIMEOUT)
    }
}

impl ReverseResolver for SystemResolver {
    fn resolve(&self, address: IpAddr) -> Result<String, ResolveError> {
        let (tx, rx) = mpsc::channel();

        // The lookup itself cannot be cancelled; on timeout the helper
        // thread is abandoned and its eventual result dropped.
        thread::spawn(move || {
            let _ = tx.send(dns_lookup::lookup_addr(&address));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(hostname)) => Ok(hostname.to_lowercase()),
            Ok(Err(e)) => Err(ResolveError::Lookup(e.to_string())),
            Err(_) => Err(ResolveError::TimedOut),
        }
    }
}

/// Match a resolved hostname against the configured allowlist.
///
/// Case-insensitive; patterns are tried in configured order and the first
/// match wins. An exact pattern matches the hostname itself or any
/// subdomain of it; a `*.domain` wildcard matches `domain` and any
/// subdomain. No match fails the check.
pub fn hostname_matches(hostname: &str, patterns: &[String]) -> bool {
    let hostname = hostname.trim_end_matches('.').to_lowercase();

    for pattern in patterns {
        let pattern = pattern.trim().trim_end_matches('.').to_lowercase();
        if pattern.is_empty() {
            continue;
        }

        if let Some(domain) = pattern.strip_prefix("*.") {
            if hostname == domain || hostname.ends_with(&format!(".{domain}")) {
                return true;
            }
        } else if hostname == pattern || hostname.ends_with(&format!(".{pattern}")) {
            return true;
        }
    }

    false
}
