// Copyright (c) 2026 the gatewall developers.
// SPDX-License-Identifier: MIT

// Gatewall admission-control core
// Policy snapshots, proxy session authentication, and the crypto
// primitives they depend on. Everything in this crate is I/O-free.

pub mod constant_time;
pub mod policy;
pub mod secret;
pub mod tokens;

pub use policy::{PolicyConfig, PolicyWarning, RawPolicy, SecurityMode};
pub use secret::SecretString;
pub use tokens::{AuthError, ProxyAuthenticator, SessionToken};
