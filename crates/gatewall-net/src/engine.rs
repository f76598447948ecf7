//! Admission evaluation
//!
//! One `AdmissionEngine` per gated service. Callers hand it a
//! `ConnectionAttempt` from their pre-admission hook and get back a
//! `Decision`; the engine never touches the transport. All three checks
//! are gated by their own enable flags; the security mode only drives
//! load-time diagnostics, never per-attempt branching.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use gatewall_core::tokens::now_unix_seconds;
use gatewall_core::{AuthError, PolicyConfig, ProxyAuthenticator};

use crate::audit::{sanitize_for_log, AuditLog};
use crate::resolver::{hostname_matches, ReverseResolver};
use crate::whitelist::WhitelistIndex;

/// Rejection text for failures other than the hostname check. The remote
/// party never sees internal error detail beyond this.
const GENERIC_REJECTION: &str = "§cConnection rejected by security";

/// One inbound login attempt. Created by the caller per event, consumed
/// here, never persisted.
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub remote_address: String,
    pub claimed_identity: String,
    pub proxy_token: Option<String>,
}

impl ConnectionAttempt {
    pub fn new(remote_address: &str, claimed_identity: &str) -> Self {
        Self {
            remote_address: remote_address.to_string(),
            claimed_identity: claimed_identity.to_string(),
            proxy_token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.proxy_token = Some(token.to_string());
        self
    }
}

/// Outcome of one evaluation. The caller owns it: admit the connection or
/// kick with `reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub admitted: bool,
    pub whitelist_passed: bool,
    pub proxy_passed: bool,
    pub hostname_passed: bool,
    /// Kick message for rejections, empty when admitted
    pub reason: String,
}

/// Everything one evaluation reads, bundled so a reload can never be
/// observed half-applied.
struct Snapshot {
    config: PolicyConfig,
    whitelist: WhitelistIndex,
    authenticator: Option<ProxyAuthenticator>,
}

impl Snapshot {
    fn build(config: PolicyConfig) -> Result<Self, AuthError> {
        let whitelist = WhitelistIndex::from_config(&config);

        let authenticator = if config.proxy_protection_enabled {
            Some(ProxyAuthenticator::new(
                config.passphrase.clone(),
                config.session_expiry_seconds,
            )?)
        } else {
            None
        };

        Ok(Self {
            config,
            whitelist,
            authenticator,
        })
    }
}

/// Gates inbound sessions against the active policy snapshot.
///
/// Evaluations run concurrently on caller threads; the snapshot is the
/// only shared state and is swapped wholesale on reload, so a reload
/// costs evaluators one pointer clone under a read lock.
pub struct AdmissionEngine {
    snapshot: RwLock<Arc<Snapshot>>,
    resolver: Box<dyn ReverseResolver>,
    audit: AuditLog,
}

impl AdmissionEngine {
    /// Build the engine. Fails only on the fatal startup case: proxy
    /// protection enabled but the authenticator cannot be constructed.
    pub fn new(
        config: PolicyConfig,
        resolver: Box<dyn ReverseResolver>,
    ) -> Result<Self, AuthError> {
        let snapshot = Snapshot::build(config)?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            resolver,
            audit: AuditLog::new(),
        })
    }

    /// Replace the active policy snapshot. In-flight evaluations keep the
    /// snapshot they started with; on error the previous snapshot stays
    /// active.
    pub fn reload(&self, config: PolicyConfig) -> Result<(), AuthError> {
        let snapshot = match Snapshot::build(config) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "policy reload rejected, keeping previous snapshot");
                return Err(e);
            }
        };
        *self.snapshot.write() = Arc::new(snapshot);
        Ok(())
    }

    /// Evaluate one connection attempt against the current snapshot.
    pub fn evaluate(&self, attempt: &ConnectionAttempt) -> Decision {
        let snapshot = Arc::clone(&self.snapshot.read());
        let config = &snapshot.config;

        let whitelist_passed =
            !config.whitelist_enabled || snapshot.whitelist.contains(&attempt.remote_address);
        let proxy_passed =
            !config.proxy_protection_enabled || check_proxy(&snapshot, attempt);
        let hostname_passed =
            !config.hostname_enabled || self.check_hostname(&snapshot, attempt);

        let admitted = whitelist_passed && proxy_passed && hostname_passed;

        let reason = if admitted {
            String::new()
        } else if config.hostname_enabled && !hostname_passed {
            config.kick_message.clone()
        } else {
            GENERIC_REJECTION.to_string()
        };

        let decision = Decision {
            admitted,
            whitelist_passed,
            proxy_passed,
            hostname_passed,
            reason,
        };

        self.audit
            .record(attempt, &decision, config.log_blocked, config.log_allowed);

        decision
    }

    /// Resolve the remote address and match it against the allowlist.
    /// Any failure along the way fails the check closed.
    fn check_hostname(&self, snapshot: &Snapshot, attempt: &ConnectionAttempt) -> bool {
        let config = &snapshot.config;

        // Deliberate escape hatch: hostname protection without reverse DNS
        // trusts the front-end to have filtered by domain already
        if !config.use_reverse_dns {
            return true;
        }

        let address: IpAddr = match attempt.remote_address.parse() {
            Ok(address) => address,
            Err(_) => {
                warn!(
                    address = %sanitize_for_log(&attempt.remote_address),
                    "hostname check failed: remote address is not a valid IP"
                );
                return false;
            }
        };

        match self.resolver.resolve(address) {
            Ok(hostname) => {
                if config.log_hostname_detail {
                    debug!(
                        address = %address,
                        hostname = %sanitize_for_log(&hostname),
                        "resolved remote hostname"
                    );
                }
                hostname_matches(&hostname, &config.allowed_hostname_patterns)
            }
            Err(e) => {
                warn!(address = %address, error = %e, "hostname resolution failed");
                false
            }
        }
    }

    /// Audit trail of every evaluated attempt.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The currently active policy (a clone; the snapshot itself stays
    /// immutable).
    pub fn active_policy(&self) -> PolicyConfig {
        self.snapshot.read().config.clone()
    }
}

/// Verify the proxy session token against the snapshot's authenticator.
/// A missing token cannot prove the connection was relayed.
fn check_proxy(snapshot: &Snapshot, attempt: &ConnectionAttempt) -> bool {
    let authenticator = match &snapshot.authenticator {
        Some(authenticator) => authenticator,
        None => return false,
    };

    match &attempt.proxy_token {
        Some(token) => {
            authenticator.verify_token(token, &attempt.claimed_identity, now_unix_seconds())
        }
        None => false,
    }
}
