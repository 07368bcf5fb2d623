//! # Identity
//!
//! The process-local identity: the KERI identifier (AID) the client holds,
//! the recovery mnemonic, and the peer id derived from it, together with
//! the space ids known for this identity.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        IDENTITY RECORD                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  aid                 KERI identifier (44 chars, 'E' prefix)         │
//! │  mnemonic            BIP-39 recovery phrase (12 or 24 words)        │
//! │  peer_id             derived from mnemonic, index 0                 │
//! │  org_aid             organisation identifier, if joined             │
//! │  *_space_id          private / community / readonly / admin spaces  │
//! │                                                                     │
//! │  Persisted as a single JSON file (identity.json, mode 0600).        │
//! │  All mutators serialise on one lock and fsync before returning.     │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The identity is a value handed to services at construction, not a
//! process-global: handlers close over the service that owns this store.

mod recovery;
mod store;

pub use recovery::RecoveryPhrase;
pub use store::{IdentityRecord, IdentityStore};

use crate::error::{Error, Result};

/// Length of a KERI identifier or SAID in characters.
pub const IDENTIFIER_LEN: usize = 44;

/// Validate the shape of a KERI identifier (AID or SAID).
///
/// Identifiers are opaque 44-character strings starting with `E`. Equality
/// is byte-level; nothing beyond the shape is checked here.
pub fn validate_identifier(value: &str) -> Result<()> {
    if value.len() != IDENTIFIER_LEN || !value.starts_with('E') {
        return Err(Error::InvalidIdentifier(format!(
            "Expected {} chars starting with 'E', got '{}'",
            IDENTIFIER_LEN, value
        )));
    }
    if !value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        return Err(Error::InvalidIdentifier(format!(
            "Identifier contains non-base64url characters: '{}'",
            value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        let good = format!("E{}", "A".repeat(43));
        assert!(validate_identifier(&good).is_ok());

        assert!(validate_identifier("EABC").is_err());
        let wrong_prefix = format!("D{}", "A".repeat(43));
        assert!(validate_identifier(&wrong_prefix).is_err());
        let bad_chars = format!("E{}!", "A".repeat(42));
        assert!(validate_identifier(&bad_chars).is_err());
    }
}
