//! # Sync Runtime
//!
//! Façade over the decentralised sync layer. The core treats the sync SDK
//! as a runtime with a small contract ([`SyncRuntime`]): space
//! create/derive/get, ACL invite/join, and tree append/read. Everything
//! behind that contract — wire protocol, CRDT encoding, transport — is
//! opaque here.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          SYNC SEAM                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │   SpaceManager ──┐                                                  │
//! │   CredentialTree ┼──►  dyn SyncRuntime  ──►  EmbeddedRuntime        │
//! │   IdentitySwapper┘         (trait)           (local replica store)  │
//! │                                                                     │
//! │   The runtime is bound to one peer key. It is never shared across   │
//! │   identity swaps: the swapper closes the old instance and           │
//! │   constructs a fresh one against the new key.                       │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The core never depends on wire ordering between peers; it assumes
//! eventual convergence and deduplicates by content address.

mod embedded;
mod runtime;
pub mod tree;

pub use embedded::EmbeddedRuntime;
pub use runtime::SyncRuntime;
pub use tree::CredentialTree;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::domain;
use crate::crypto::KeySet;
use crate::spaces::SpaceType;

/// Handle describing a space known to the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceHandle {
    /// Deterministic space identifier
    pub space_id: String,
    /// Owning identifier
    pub owner_id: String,
    /// Space flavour
    pub space_type: SpaceType,
    /// Whether invites may be issued
    pub shareable: bool,
}

/// One materialised tree entry
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Content-derived change identifier
    pub change_id: String,
    /// Decrypted payload bytes
    pub payload: Vec<u8>,
}

/// Permission set baked into an invite or granted by a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// May read tree content
    pub read: bool,
    /// May append to trees
    pub write: bool,
    /// May manage the ACL
    pub admin: bool,
}

impl Permissions {
    /// Owner permissions
    pub fn full() -> Self {
        Self { read: true, write: true, admin: true }
    }

    /// Member permissions in a writable community space
    pub fn read_write() -> Self {
        Self { read: true, write: true, admin: false }
    }

    /// Member permissions in a read-only space
    pub fn read_only() -> Self {
        Self { read: true, write: false, admin: false }
    }

    /// No access
    pub fn none() -> Self {
        Self { read: false, write: false, admin: false }
    }
}

/// Derive the deterministic space id for `(owner, type, key set)`.
///
/// Pure: no network or disk I/O. The id is a hash over the signing public
/// key, the space type, and the owner id, rendered in the common
/// 44-character identifier shape, so the same mnemonic and owner always
/// recover the same id.
pub fn derive_space_id(owner_id: &str, space_type: SpaceType, key_set: &KeySet) -> String {
    use base64::Engine;
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(domain::SPACE_ID);
    hasher.update(key_set.signing.public_bytes());
    hasher.update(space_type.as_str().as_bytes());
    hasher.update(owner_id.as_bytes());
    let digest = hasher.finalize();

    // 32 bytes → 43 base64url chars; 'E' prefix matches the identifier shape
    format!(
        "E{}",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_id_deterministic() {
        let keys = KeySet::generate();

        let a = derive_space_id("EOWNER", SpaceType::Private, &keys);
        let b = derive_space_id("EOWNER", SpaceType::Private, &keys);

        assert_eq!(a, b);
        assert_eq!(a.len(), 44);
        assert!(a.starts_with('E'));
    }

    #[test]
    fn test_space_id_varies_with_inputs() {
        let keys = KeySet::generate();
        let other_keys = KeySet::generate();

        let base = derive_space_id("EOWNER", SpaceType::Private, &keys);

        assert_ne!(base, derive_space_id("EOWNER", SpaceType::Community, &keys));
        assert_ne!(base, derive_space_id("EOTHER", SpaceType::Private, &keys));
        assert_ne!(base, derive_space_id("EOWNER", SpaceType::Private, &other_keys));
    }

    #[test]
    fn test_space_id_ignores_read_key() {
        // Only the signing key participates, so a regenerated random read
        // key does not change the recovered id.
        let keys = KeySet::generate();
        let mut rekeyed = keys.duplicate();
        rekeyed.read = crate::crypto::ReadKey::generate();

        assert_eq!(
            derive_space_id("EOWNER", SpaceType::Private, &keys),
            derive_space_id("EOWNER", SpaceType::Private, &rekeyed)
        );
    }
}
