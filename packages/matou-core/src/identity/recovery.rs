//! # Recovery Phrase (BIP39)
//!
//! BIP39 mnemonic handling for identity backup and re-keying.
//!
//! The phrase is the root of every key this service manages: the peer key
//! and all per-space Ed25519 keys derive from its seed (see
//! [`crate::crypto::kdf`]). Both 12-word (128-bit) and 24-word (256-bit)
//! phrases are accepted; clients migrating older identities still carry
//! 12-word phrases.
//!
//! | Aspect | Measure |
//! |--------|---------|
//! | Entropy | 128 or 256 bits from OS CSPRNG |
//! | Checksum | BIP39 word checksum prevents typos |
//! | KDF | PBKDF2-HMAC-SHA512, 2048 iterations |
//! | Display | Never logged; Debug output is redacted |

use bip39::Mnemonic;
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Accepted phrase lengths in words.
pub const ACCEPTED_WORD_COUNTS: [usize; 2] = [12, 24];

/// Entropy size in bytes for a generated phrase (24 words).
const ENTROPY_BYTES: usize = 32;

/// A BIP39 recovery phrase backing an identity
///
/// ## Security Warning
///
/// - This phrase can fully recover the user's identity and every space key
/// - Never log it or store it outside `identity.json`
#[derive(ZeroizeOnDrop)]
pub struct RecoveryPhrase {
    /// The underlying BIP39 mnemonic
    #[zeroize(skip)] // bip39::Mnemonic doesn't implement Zeroize
    mnemonic: Mnemonic,
}

impl RecoveryPhrase {
    /// Generate a new random 24-word recovery phrase
    pub fn generate() -> Result<Self> {
        let mut entropy = [0u8; ENTROPY_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy(&entropy).map_err(|e| {
            Error::KeyDerivationFailed(format!("Failed to generate mnemonic: {}", e))
        })?;

        Ok(Self { mnemonic })
    }

    /// Parse a recovery phrase
    ///
    /// ## Validation
    ///
    /// - Must be 12 or 24 words
    /// - All words must be in the BIP39 English wordlist
    /// - Checksum must be valid
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_normalized(phrase)
            .map_err(|e| Error::InvalidMnemonic(format!("{}", e)))?;

        if !ACCEPTED_WORD_COUNTS.contains(&mnemonic.word_count()) {
            return Err(Error::InvalidMnemonic(format!(
                "Expected 12 or 24 words, got {}",
                mnemonic.word_count()
            )));
        }

        Ok(Self { mnemonic })
    }

    /// The phrase as a single string (words separated by spaces)
    ///
    /// Only for persisting into `identity.json`. Never log.
    pub fn phrase(&self) -> String {
        self.mnemonic.to_string()
    }

    /// Number of words in the phrase
    pub fn word_count(&self) -> usize {
        self.mnemonic.word_count()
    }

    /// Derive the 32-byte master seed (empty passphrase)
    ///
    /// BIP39 seed derivation produces 64 bytes; the first 32 are the
    /// master seed every key index derives from.
    pub fn to_seed(&self) -> [u8; 32] {
        let seed_bytes = self.mnemonic.to_seed("");

        let mut master_seed = [0u8; 32];
        master_seed.copy_from_slice(&seed_bytes[..32]);
        master_seed
    }

    /// Validate a phrase without keeping it
    pub fn validate(phrase: &str) -> Result<()> {
        Self::from_phrase(phrase)?;
        Ok(())
    }
}

// Prevent accidental logging
impl std::fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecoveryPhrase([REDACTED])")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TWELVE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_recovery_phrase() {
        let phrase = RecoveryPhrase::generate().unwrap();
        assert_eq!(phrase.word_count(), 24);
    }

    #[test]
    fn test_parse_twelve_words() {
        let phrase = RecoveryPhrase::from_phrase(TWELVE).unwrap();
        assert_eq!(phrase.word_count(), 12);
    }

    #[test]
    fn test_parse_invalid_word() {
        let result = RecoveryPhrase::from_phrase(
            "notaword abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_wrong_word_count() {
        assert!(RecoveryPhrase::from_phrase("abandon abandon abandon").is_err());
    }

    #[test]
    fn test_bad_checksum_rejected() {
        // 12 valid words with a broken checksum
        let result = RecoveryPhrase::from_phrase(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_seed_derivation_deterministic() {
        let p1 = RecoveryPhrase::from_phrase(TWELVE).unwrap();
        let p2 = RecoveryPhrase::from_phrase(TWELVE).unwrap();

        assert_eq!(p1.to_seed(), p2.to_seed());
    }

    #[test]
    fn test_different_phrases_different_seeds() {
        let p1 = RecoveryPhrase::generate().unwrap();
        let p2 = RecoveryPhrase::generate().unwrap();

        assert_ne!(p1.to_seed(), p2.to_seed());
    }

    #[test]
    fn test_debug_redacts() {
        let phrase = RecoveryPhrase::from_phrase(TWELVE).unwrap();
        let debug = format!("{:?}", phrase);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("abandon"));
    }
}
