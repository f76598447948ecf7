//! Zeroize-on-drop storage for the proxy passphrase
//!
//! The passphrase is the only long-lived secret this crate holds. Keeping
//! it in a wrapper that zeros its memory on drop and redacts itself in
//! `Debug` output means config snapshots can be logged without leaking it.

use std::fmt;
use zeroize::Zeroize;

/// A string that zeros its backing memory when dropped.
#[derive(Clone, Default)]
pub struct SecretString {
    data: String,
}

impl SecretString {
    pub fn new(data: String) -> Self {
        Self { data }
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            data: s.to_string(),
        }
    }

    /// Expose the secret. Callers must not copy it into longer-lived storage.
    pub fn expose(&self) -> &str {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// Prevent accidentally printing the passphrase
impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED {} chars])", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_contents() {
        let secret = SecretString::from_str("hunter2");
        assert_eq!(secret.expose(), "hunter2");
        assert_eq!(secret.len(), 7);
        assert!(!secret.is_empty());
    }

    #[test]
    fn debug_is_redacted() {
        let secret = SecretString::from_str("hunter2");
        let debug = format!("{:?}", secret);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("hunter2"));
    }
}
