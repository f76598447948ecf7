// Copyright (c) 2026 the gatewall developers.
// SPDX-License-Identifier: MIT

// Gatewall admission-control engine
// Evaluates inbound connection attempts against the active policy
// snapshot: IP whitelist, proxy session token, reverse-DNS hostname.

// Decision audit trail
pub mod audit;

// Admission evaluation and snapshot reload
pub mod engine;

// Reverse-DNS resolution and hostname pattern matching
pub mod resolver;

// O(1) membership test over configured addresses
pub mod whitelist;

pub use audit::{AuditEntry, AuditLog, AuditStats};
pub use engine::{AdmissionEngine, ConnectionAttempt, Decision};
pub use resolver::{hostname_matches, ResolveError, ReverseResolver, SystemResolver};
pub use whitelist::WhitelistIndex;
