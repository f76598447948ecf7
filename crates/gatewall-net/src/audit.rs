//! Decision audit trail
//!
//! Every evaluated attempt produces one audit entry. Entries are kept in a
//! bounded in-memory ring, hash-chained so that tampering with a stored
//! entry (or dropping one) is detectable, and mirrored to the structured
//! log gated by the policy's logging flags.

use std::collections::VecDeque;

use blake3::Hasher;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{ConnectionAttempt, Decision};

/// Maximum audit entries retained in memory.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// One evaluated connection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
    /// Claimed identity, sanitized for storage
    pub identity: String,
    /// Remote address as supplied by the host
    pub address: String,
    /// Final outcome
    pub admitted: bool,
    /// Individual check outcomes
    pub whitelist_passed: bool,
    pub proxy_passed: bool,
    pub hostname_passed: bool,
    /// Kick message for rejections, empty otherwise
    pub reason: String,
    /// Chain link to the previous entry
    pub prev_hash: [u8; 32],
    /// This entry's hash
    pub entry_hash: [u8; 32],
}

impl AuditEntry {
    fn new(attempt: &ConnectionAttempt, decision: &Decision, prev_hash: [u8; 32]) -> Self {
        let timestamp = Utc::now();
        let identity = sanitize_for_log(&attempt.claimed_identity);
        let address = sanitize_for_log(&attempt.remote_address);

        let entry_hash = Self::compute_hash(
            &timestamp,
            &identity,
            &address,
            decision,
            &prev_hash,
        );

        Self {
            timestamp,
            identity,
            address,
            admitted: decision.admitted,
            whitelist_passed: decision.whitelist_passed,
            proxy_passed: decision.proxy_passed,
            hostname_passed: decision.hostname_passed,
            reason: decision.reason.clone(),
            prev_hash,
            entry_hash,
        }
    }

    fn compute_hash(
        timestamp: &DateTime<Utc>,
        identity: &str,
        address: &str,
        decision: &Decision,
        prev_hash: &[u8; 32],
    ) -> [u8; 32] {
        let mut hasher = Hasher::new();
        hasher.update(&timestamp.timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
        hasher.update(identity.as_bytes());
        hasher.update(address.as_bytes());
        hasher.update(&[
            decision.admitted as u8,
            decision.whitelist_passed as u8,
            decision.proxy_passed as u8,
            decision.hostname_passed as u8,
        ]);
        hasher.update(decision.reason.as_bytes());
        hasher.update(prev_hash);

        let mut out = [0u8; 32];
        out.copy_from_slice(hasher.finalize().as_bytes());
        out
    }

    /// Recompute this entry's hash and compare.
    pub fn verify(&self) -> bool {
        let decision = Decision {
            admitted: self.admitted,
            whitelist_passed: self.whitelist_passed,
            proxy_passed: self.proxy_passed,
            hostname_passed: self.hostname_passed,
            reason: self.reason.clone(),
        };
        let expected = Self::compute_hash(
            &self.timestamp,
            &self.identity,
            &self.address,
            &decision,
            &self.prev_hash,
        );
        self.entry_hash == expected
    }
}

/// Running audit statistics.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub allowed: u64,
    pub blocked: u64,
    /// Current chain head hash, hex
    pub head_hash: Option<String>,
}

/// Bounded, hash-chained audit log.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    stats: RwLock<AuditStats>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(64)),
            stats: RwLock::new(AuditStats::default()),
        }
    }

    /// Append a decision and emit the gated log line.
    pub fn record(
        &self,
        attempt: &ConnectionAttempt,
        decision: &Decision,
        log_blocked: bool,
        log_allowed: bool,
    ) {
        let entry = {
            let mut entries = self.entries.write();

            let prev_hash = entries.back().map(|e| e.entry_hash).unwrap_or([0u8; 32]);
            let entry = AuditEntry::new(attempt, decision, prev_hash);

            if entries.len() >= MAX_AUDIT_ENTRIES {
                entries.pop_front();
            }
            entries.push_back(entry.clone());

            // Stats must advance inside the entries critical section:
            // releasing it first lets a racing record publish a stale
            // head_hash after the chain has moved on.
            let mut stats = self.stats.write();
            stats.total += 1;
            if decision.admitted {
                stats.allowed += 1;
            } else {
                stats.blocked += 1;
            }
            stats.head_hash = Some(hex::encode(entry.entry_hash));

            entry
        };

        if decision.admitted {
            if log_allowed {
                info!(
                    identity = %entry.identity,
                    address = %entry.address,
                    "allowed connection"
                );
            }
        } else if log_blocked {
            warn!(
                identity = %entry.identity,
                address = %entry.address,
                whitelist = decision.whitelist_passed,
                proxy = decision.proxy_passed,
                hostname = decision.hostname_passed,
                "blocked connection"
            );
        }
    }

    /// Walk the chain and verify every entry and link.
    pub fn verify_chain(&self) -> bool {
        let entries = self.entries.read();

        let mut expected_prev = match entries.front() {
            Some(first) => first.prev_hash,
            None => return true,
        };

        for entry in entries.iter() {
            if !entry.verify() || entry.prev_hash != expected_prev {
                return false;
            }
            expected_prev = entry.entry_hash;
        }

        true
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> AuditStats {
        self.stats.read().clone()
    }

    /// Export the retained entries with their chain metadata.
    pub fn export_json(&self) -> String {
        let entries: Vec<_> = self.entries.read().iter().cloned().collect();
        let stats = self.stats();

        #[derive(Serialize)]
        struct ExportManifest {
            exported_at: DateTime<Utc>,
            entry_count: usize,
            stats: AuditStats,
            entries: Vec<AuditEntry>,
        }

        let manifest = ExportManifest {
            exported_at: Utc::now(),
            entry_count: entries.len(),
            stats,
            entries,
        };

        serde_json::to_string_pretty(&manifest).unwrap_or_default()
    }
}

/// Strip control characters and cap the length of remote-supplied strings
/// before they reach storage or the log.
pub fn sanitize_for_log(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).take(256).collect()
}
