//! Proxy session authentication (HMAC-SHA256)
//!
//! A trusted front-end proxy proves it relayed a connection by handing the
//! backend a signed session token. This module does three things:
//! 1. Low-level `sign` / `verify` over a canonical payload
//! 2. A `ProxyAuthenticator` binding a passphrase to an expiry window
//! 3. Random session-key generation for correlating one handshake
//!
//! Wire form: `<identity>|<unix_seconds>|<nonce>.<base64 hmac>`. The
//! payload sits left of the final dot, the base64-encoded HMAC-SHA256
//! digest (keyed by the shared passphrase) on the right. Base64 never
//! produces a dot, so the split is unambiguous.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::constant_time::constant_time_compare_str;
use crate::secret::SecretString;

type HmacSha256 = Hmac<Sha256>;

/// Forward clock drift tolerated between proxy and backend, in seconds.
/// A token stamped further in the future than this is rejected.
pub const CLOCK_SKEW_TOLERANCE_SECS: u64 = 30;

/// Fatal authenticator construction errors.
///
/// Verification itself never errors: any malformed or mismatching input
/// simply fails closed. Only building the authenticator can fail, because
/// no proxy check can ever succeed without a usable MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The configured passphrase is empty.
    EmptyPassphrase,
    /// The HMAC primitive rejected the key material.
    MacInit,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPassphrase => write!(f, "proxy passphrase is empty"),
            Self::MacInit => write!(f, "HMAC-SHA256 initialization failed"),
        }
    }
}

impl std::error::Error for AuthError {}

/// A parsed session token: signed payload plus its detached signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub payload: String,
    pub signature: String,
}

impl SessionToken {
    /// Render the token in its wire form.
    pub fn encode(&self) -> String {
        format!("{}.{}", self.payload, self.signature)
    }

    /// Split a wire-form token at the final dot.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.rsplit_once('.') {
            Some((payload, signature)) if !payload.is_empty() && !signature.is_empty() => {
                Some(Self {
                    payload: payload.to_string(),
                    signature: signature.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// The payload fields verification consults. The nonce only has to be
/// present and non-empty; its value is covered by the signature.
struct TokenPayload<'a> {
    identity: &'a str,
    issued_at: u64,
}

/// Parse `identity|unix_seconds|nonce`. The nonce and timestamp cannot
/// contain `|`, so splitting from the right keeps identities with pipes
/// intact.
fn parse_payload(payload: &str) -> Option<TokenPayload<'_>> {
    let (rest, nonce) = payload.rsplit_once('|')?;
    let (identity, stamp) = rest.rsplit_once('|')?;

    if identity.is_empty() || nonce.is_empty() {
        return None;
    }

    let issued_at = stamp.parse::<u64>().ok()?;

    Some(TokenPayload {
        identity,
        issued_at,
    })
}

/// HMAC-SHA256 over the UTF-8 payload, keyed by the UTF-8 passphrase,
/// base64-encoded.
pub fn sign(payload: &str, passphrase: &str) -> Result<String, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(passphrase.as_bytes()).map_err(|_| AuthError::MacInit)?;
    mac.update(payload.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a detached signature over `payload`.
///
/// Fails closed on malformed payloads, empty passphrases, timestamps
/// outside the expiry/skew window, and digest mismatches. The digest
/// comparison is constant-time.
pub fn verify(
    payload: &str,
    signature: &str,
    passphrase: &str,
    now_seconds: u64,
    expiry_seconds: u64,
) -> bool {
    if passphrase.is_empty() {
        return false;
    }

    let parsed = match parse_payload(payload) {
        Some(parsed) => parsed,
        None => return false,
    };

    if !timestamp_in_window(parsed.issued_at, now_seconds, expiry_seconds) {
        return false;
    }

    match sign(payload, passphrase) {
        Ok(expected) => constant_time_compare_str(&expected, signature),
        Err(_) => false,
    }
}

/// A token is live from `issued_at - skew` until `issued_at + expiry`.
fn timestamp_in_window(issued_at: u64, now_seconds: u64, expiry_seconds: u64) -> bool {
    if issued_at > now_seconds.saturating_add(CLOCK_SKEW_TOLERANCE_SECS) {
        return false;
    }
    now_seconds <= issued_at.saturating_add(expiry_seconds)
}

/// Generate a 128-bit random session key, hex-encoded.
///
/// Correlates a proxy-issued token to one handshake; carries no meaning
/// past that exchange.
pub fn generate_session_key() -> String {
    let mut key = [0u8; 16];
    OsRng.fill_bytes(&mut key);
    hex::encode(key)
}

/// Seconds since the Unix epoch.
pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Binds the shared passphrase to a session expiry window.
pub struct ProxyAuthenticator {
    passphrase: SecretString,
    session_expiry_seconds: u64,
}

impl ProxyAuthenticator {
    /// Build an authenticator, or report the fatal startup fault.
    pub fn new(passphrase: SecretString, session_expiry_seconds: u64) -> Result<Self, AuthError> {
        if passphrase.is_empty() {
            return Err(AuthError::EmptyPassphrase);
        }

        // Prove the MAC primitive is usable now so that per-connection
        // verification can stay a plain boolean.
        HmacSha256::new_from_slice(passphrase.expose().as_bytes())
            .map_err(|_| AuthError::MacInit)?;

        Ok(Self {
            passphrase,
            session_expiry_seconds,
        })
    }

    /// Issue a token for `identity`, stamped `now_seconds`, with a fresh
    /// random nonce. This is the proxy-side half of the exchange.
    pub fn issue(&self, identity: &str, now_seconds: u64) -> Result<SessionToken, AuthError> {
        let payload = format!(
            "{}|{}|{}",
            identity,
            now_seconds,
            generate_session_key()
        );
        let signature = sign(&payload, self.passphrase.expose())?;
        Ok(SessionToken { payload, signature })
    }

    /// Verify a detached payload/signature pair.
    pub fn verify(&self, payload: &str, signature: &str, now_seconds: u64) -> bool {
        verify(
            payload,
            signature,
            self.passphrase.expose(),
            now_seconds,
            self.session_expiry_seconds,
        )
    }

    /// Verify a wire-form token and bind it to the identity the remote
    /// party claims. Any parse failure or identity mismatch fails closed.
    pub fn verify_token(&self, raw: &str, claimed_identity: &str, now_seconds: u64) -> bool {
        let token = match SessionToken::parse(raw) {
            Some(token) => token,
            None => return false,
        };

        match parse_payload(&token.payload) {
            Some(parsed) if parsed.identity == claimed_identity => {}
            _ => return false,
        }

        self.verify(&token.payload, &token.signature, now_seconds)
    }
}

impl fmt::Debug for ProxyAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuthenticator")
            .field("passphrase", &self.passphrase)
            .field("session_expiry_seconds", &self.session_expiry_seconds)
            .finish()
    }
}
