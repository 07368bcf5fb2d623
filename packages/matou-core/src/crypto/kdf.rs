//! # Key Derivation
//!
//! Deterministic key derivation from the BIP-39 master seed.
//!
//! ## Derivation Schedule
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     SEED INDEX SCHEDULE                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  BIP-39 seed (first 32 bytes of PBKDF2 output)                      │
//! │        │                                                            │
//! │        ▼                                                            │
//! │  HKDF-SHA256(ikm = seed, info = "matou-key-index-v1" || LE32(i))    │
//! │                                                                     │
//! │  index 0        → user peer key (Ed25519)                           │
//! │  index 4s       → space s signing key   (overwritten by peer key)   │
//! │  index 4s + 1   → space s master key                                │
//! │  index 4s + 2   → space s metadata key                              │
//! │  index 4s + 3   → reserved (read keys are random, never derived)    │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Read keys are AES-256 symmetric and cannot be recovered from an
//! Ed25519 derivation path; they are generated once and persisted with
//! the rest of the key set.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{Error, Result};

/// Domain separation strings for HKDF
///
/// Keys derived for different purposes stay cryptographically independent
/// even when derived from the same master seed.
pub mod domain {
    /// Domain for indexed key derivation from the master seed
    pub const KEY_INDEX: &[u8] = b"matou-key-index-v1";

    /// Domain for deterministic space-id derivation
    pub const SPACE_ID: &[u8] = b"matou-space-id-v1";

    /// Domain for sealing a space read key to an invite key
    pub const INVITE_SEAL: &[u8] = b"matou-invite-seal-v1";
}

/// Seed index of the user's peer key.
pub const PEER_KEY_INDEX: u32 = 0;

/// Number of seed indices reserved per space.
pub const INDICES_PER_SPACE: u32 = 4;

/// Derive the 32-byte key material at a seed index.
///
/// Deterministic: the same `(seed, index)` pair always yields the same
/// bytes. The index is bound into the HKDF `info` parameter so adjacent
/// indices are independent.
pub fn derive_key_at_index(seed: &[u8; 32], index: u32) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(None, seed);

    let mut info = Vec::with_capacity(domain::KEY_INDEX.len() + 4);
    info.extend_from_slice(domain::KEY_INDEX);
    info.extend_from_slice(&index.to_le_bytes());

    let mut key = [0u8; 32];
    hkdf.expand(&info, &mut key)
        .map_err(|_| Error::KeyDerivationFailed(format!("HKDF expansion failed at index {}", index)))?;

    Ok(key)
}

/// First seed index of the key block for space `space_index`.
pub fn space_base_index(space_index: u32) -> u32 {
    space_index * INDICES_PER_SPACE
}

// ============================================================================
// TESTS
// ============================================================================
