//! Session identifiers.

use std::fmt;

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes drawn per identifier.
const ENTROPY_BYTES: usize = 16;

/// Length of the rendered identifier in hex characters.
pub const SESSION_ID_LEN: usize = 32;

/// An opaque, unguessable session identifier.
///
/// Rendered as 32 lowercase hex characters. Identifiers are drawn from the
/// thread-local CSPRNG and never checked against storage for uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        let mut entropy = [0u8; ENTROPY_BYTES];
        rand::rng().fill_bytes(&mut entropy);

        let digest = Sha256::digest(entropy);
        Self(hex::encode(&digest[..SESSION_ID_LEN / 2]))
    }

    /// Parse an identifier received from a client.
    ///
    /// Returns `None` for anything that is not exactly 32 lowercase hex
    /// characters.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == SESSION_ID_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form used in log fields.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: HashSet<_> = (0..1000).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generated_id_parses() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), SESSION_ID_LEN);
        assert_eq!(SessionId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("abc").is_none());
        assert!(SessionId::parse(&"A".repeat(32)).is_none());
        assert!(SessionId::parse(&"g".repeat(32)).is_none());
        assert!(SessionId::parse(&"a".repeat(33)).is_none());
    }

    proptest! {
        /// Property: only 32-char lowercase hex strings parse.
        #[test]
        fn parse_accepts_only_lower_hex(s in "[0-9a-zA-Z]{0,40}") {
            let expected = s.len() == 32 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
            prop_assert_eq!(SessionId::parse(&s).is_some(), expected);
        }
    }
}
