//! Constant-time comparison for authentication material
//!
//! Token and signature checks must not leak, through timing, where two
//! values first differ. The only data-dependent early exit allowed here
//! is on length, which the wire format already reveals.

/// Compare two byte slices in constant time.
///
/// Returns false immediately for differing lengths; otherwise every
/// position is visited and the differences are XOR-accumulated, so the
/// running time is independent of where (or whether) the inputs differ.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }

    diff == 0
}

/// Compare two strings in constant time.
///
/// Used for base64 HMAC signatures and session identifiers.
pub fn constant_time_compare_str(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_match() {
        assert!(constant_time_compare(b"gZk3+signature==", b"gZk3+signature=="));
        assert!(constant_time_compare_str("session-key", "session-key"));
    }

    #[test]
    fn differing_content_rejected() {
        // Difference in the first position
        assert!(!constant_time_compare(b"Aignature", b"signature"));
        // Difference in the last position
        assert!(!constant_time_compare(b"signaturA", b"signature"));
        // Difference in the middle
        assert!(!constant_time_compare(b"signAture", b"signature"));
    }

    #[test]
    fn differing_length_rejected() {
        assert!(!constant_time_compare(b"short", b"a longer value"));
        assert!(!constant_time_compare_str("", "x"));
    }

    #[test]
    fn empty_inputs_match() {
        assert!(constant_time_compare(b"", b""));
    }
}
