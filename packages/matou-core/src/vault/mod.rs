//! # Key Vault
//!
//! Derives and persists the key material this node manages: the user's
//! peer key and one four-key [`KeySet`] per space.
//!
//! ## Layout on disk
//!
//! ```text
//! {data_dir}/peer.key              user peer key, indexed by identifier
//! {data_dir}/keys/{space_id}.keys  per-space key bundle
//! ```
//!
//! Both files are JSON bundles with hex-encoded key bytes, written with
//! owner-only permissions (mode 0600). The peer key lives in its own file
//! so it can be re-attached after an identity swap without enumerating
//! spaces.
//!
//! ## Derivation policy
//!
//! Space key sets derive from the mnemonic seed at the schedule in
//! [`crate::crypto::kdf`]; the read key is random and only ever persisted.
//! On every space create or recovery the derived signing key is
//! overwritten with the user's peer key before persisting, so the space
//! signing key and the peer key always marshal to identical bytes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{derive_key_at_index, space_base_index, PEER_KEY_INDEX};
use crate::crypto::{KeySet, ReadKey, SigningKeyPair};
use crate::error::{Error, Result};
use crate::identity::RecoveryPhrase;
use crate::time::now_timestamp;

/// File name of the persisted user peer key.
const PEER_KEY_FILE: &str = "peer.key";

/// Directory holding per-space key bundles.
const KEYS_DIR: &str = "keys";

/// On-disk form of a space key set
#[derive(Serialize, Deserialize)]
struct KeySetBundle {
    signing: String,
    master: String,
    read: String,
    metadata: String,
    created_at: i64,
}

/// On-disk form of the user peer key
#[derive(Serialize, Deserialize)]
struct PeerKeyBundle {
    user_id: String,
    signing: String,
    created_at: i64,
}

/// Derives and persists peer and space keys under one data directory
pub struct KeyVault {
    data_dir: PathBuf,
}

impl KeyVault {
    /// Create a vault rooted at `data_dir`, creating the keys directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir.join(KEYS_DIR))
            .map_err(|e| Error::StorageWrite(format!("{}: {}", data_dir.display(), e)))?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    // ========================================================================
    // DERIVATION
    // ========================================================================

    /// Derive the user's peer key from a mnemonic (seed index 0).
    pub fn derive_peer_key(phrase: &RecoveryPhrase) -> Result<SigningKeyPair> {
        let seed = phrase.to_seed();
        let bytes = derive_key_at_index(&seed, PEER_KEY_INDEX)?;
        Ok(SigningKeyPair::from_bytes(&bytes))
    }

    /// Derive the key set for space index `space_index`.
    ///
    /// Signing, master, and metadata keys come from the seed schedule; the
    /// read key is freshly random and must be persisted to survive.
    pub fn derive_space_key_set(phrase: &RecoveryPhrase, space_index: u32) -> Result<KeySet> {
        let seed = phrase.to_seed();
        let base = space_base_index(space_index);

        let signing = derive_key_at_index(&seed, base)?;
        let master = derive_key_at_index(&seed, base + 1)?;
        let metadata = derive_key_at_index(&seed, base + 2)?;

        Ok(KeySet {
            signing: SigningKeyPair::from_bytes(&signing),
            master: SigningKeyPair::from_bytes(&master),
            read: ReadKey::generate(),
            metadata: SigningKeyPair::from_bytes(&metadata),
        })
    }

    /// Generate a key set with all four keys random.
    pub fn generate_space_key_set() -> KeySet {
        KeySet::generate()
    }

    // ========================================================================
    // SPACE KEY SETS
    // ========================================================================

    /// Persist a space key set to `keys/{space_id}.keys` (mode 0600).
    pub fn persist(&self, space_id: &str, key_set: &KeySet) -> Result<()> {
        let bundle = KeySetBundle {
            signing: hex::encode(key_set.signing.secret_bytes()),
            master: hex::encode(key_set.master.secret_bytes()),
            read: hex::encode(key_set.read.secret_bytes()),
            metadata: hex::encode(key_set.metadata.secret_bytes()),
            created_at: now_timestamp(),
        };

        let path = self.space_keys_path(space_id);
        write_private_json(&path, &bundle)
    }

    /// Load a space key set from disk.
    pub fn load(&self, space_id: &str) -> Result<KeySet> {
        let path = self.space_keys_path(space_id);
        let bundle: KeySetBundle = read_private_json(&path)?;

        Ok(KeySet {
            signing: SigningKeyPair::from_bytes(&decode_key(&bundle.signing, &path)?),
            master: SigningKeyPair::from_bytes(&decode_key(&bundle.master, &path)?),
            read: ReadKey::from_bytes(decode_key(&bundle.read, &path)?),
            metadata: SigningKeyPair::from_bytes(&decode_key(&bundle.metadata, &path)?),
        })
    }

    /// Whether a key set exists for this space.
    pub fn has_key_set(&self, space_id: &str) -> bool {
        self.space_keys_path(space_id).exists()
    }

    // ========================================================================
    // USER PEER KEY
    // ========================================================================

    /// Persist the user peer key to `peer.key` (mode 0600).
    pub fn persist_user_peer_key(&self, user_id: &str, key: &SigningKeyPair) -> Result<()> {
        let bundle = PeerKeyBundle {
            user_id: user_id.to_string(),
            signing: hex::encode(key.secret_bytes()),
            created_at: now_timestamp(),
        };
        write_private_json(&self.peer_key_path(), &bundle)
    }

    /// Load the user peer key, verifying it belongs to `user_id`.
    pub fn load_user_peer_key(&self, user_id: &str) -> Result<SigningKeyPair> {
        let path = self.peer_key_path();
        let bundle: PeerKeyBundle = read_private_json(&path)?;

        if bundle.user_id != user_id {
            return Err(Error::InvalidKey(format!(
                "Peer key belongs to {}, not {}",
                bundle.user_id, user_id
            )));
        }

        Ok(SigningKeyPair::from_bytes(&decode_key(&bundle.signing, &path)?))
    }

    fn space_keys_path(&self, space_id: &str) -> PathBuf {
        self.data_dir.join(KEYS_DIR).join(format!("{}.keys", space_id))
    }

    fn peer_key_path(&self) -> PathBuf {
        self.data_dir.join(PEER_KEY_FILE)
    }
}

// ============================================================================
// FILE HELPERS
// ============================================================================

fn write_private_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    let mut file = fs::File::create(path)
        .map_err(|e| Error::StorageWrite(format!("{}: {}", path.display(), e)))?;
    file.write_all(json.as_bytes())
        .map_err(|e| Error::StorageWrite(format!("{}: {}", path.display(), e)))?;
    file.sync_all()
        .map_err(|e| Error::StorageWrite(format!("{}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::StorageWrite(format!("{}: {}", path.display(), e)))?;
    }

    Ok(())
}

fn read_private_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::StorageRead(format!("{} does not exist", path.display())));
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::StorageRead(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| Error::Corrupted(format!("{}: {}", path.display(), e)))
}

fn decode_key(hex_str: &str, path: &Path) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| Error::Corrupted(format!("{}: bad hex: {}", path.display(), e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::Corrupted(format!("{}: key has wrong length", path.display())))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TWELVE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn phrase() -> RecoveryPhrase {
        RecoveryPhrase::from_phrase(TWELVE).unwrap()
    }

    #[test]
    fn test_peer_key_deterministic() {
        let k1 = KeyVault::derive_peer_key(&phrase()).unwrap();
        let k2 = KeyVault::derive_peer_key(&phrase()).unwrap();

        assert_eq!(k1.secret_bytes(), k2.secret_bytes());
    }

    #[test]
    fn test_different_mnemonics_different_keys() {
        let other = RecoveryPhrase::generate().unwrap();

        let k1 = KeyVault::derive_peer_key(&phrase()).unwrap();
        let k2 = KeyVault::derive_peer_key(&other).unwrap();
        assert_ne!(k1.secret_bytes(), k2.secret_bytes());

        let s1 = KeyVault::derive_space_key_set(&phrase(), 1).unwrap();
        let s2 = KeyVault::derive_space_key_set(&other, 1).unwrap();
        assert_ne!(s1.master.secret_bytes(), s2.master.secret_bytes());
        assert_ne!(s1.metadata.secret_bytes(), s2.metadata.secret_bytes());
    }

    #[test]
    fn test_space_key_set_ed25519_deterministic() {
        let s1 = KeyVault::derive_space_key_set(&phrase(), 2).unwrap();
        let s2 = KeyVault::derive_space_key_set(&phrase(), 2).unwrap();

        assert_eq!(s1.signing.secret_bytes(), s2.signing.secret_bytes());
        assert_eq!(s1.master.secret_bytes(), s2.master.secret_bytes());
        assert_eq!(s1.metadata.secret_bytes(), s2.metadata.secret_bytes());
        // Read keys are random, never derived
        assert_ne!(s1.read.secret_bytes(), s2.read.secret_bytes());
    }

    #[test]
    fn test_persist_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = KeyVault::open(dir.path()).unwrap();

        let set = KeyVault::generate_space_key_set();
        vault.persist("ESPACE1", &set).unwrap();

        let loaded = vault.load("ESPACE1").unwrap();
        assert_eq!(loaded.signing.secret_bytes(), set.signing.secret_bytes());
        assert_eq!(loaded.master.secret_bytes(), set.master.secret_bytes());
        assert_eq!(loaded.metadata.secret_bytes(), set.metadata.secret_bytes());

        // The loaded read key decrypts what the original encrypted
        let sealed = set.read.encrypt(b"payload", b"aad").unwrap();
        assert_eq!(loaded.read.decrypt(&sealed, b"aad").unwrap(), b"payload");
    }

    #[test]
    fn test_peer_key_recovery_across_spaces() {
        // Recovery scenario: derive, override signing with the peer key,
        // persist, load — loaded signing bytes equal the recomputed peer key.
        let dir = tempfile::tempdir().unwrap();
        let vault = KeyVault::open(dir.path()).unwrap();
        let peer = KeyVault::derive_peer_key(&phrase()).unwrap();

        for index in 0..4u32 {
            let mut set = KeyVault::derive_space_key_set(&phrase(), index).unwrap();
            set.override_signing(&peer);
            vault.persist(&format!("ESPACE{}", index), &set).unwrap();
        }

        let recomputed = KeyVault::derive_peer_key(&phrase()).unwrap();
        for index in 0..4u32 {
            let loaded = vault.load(&format!("ESPACE{}", index)).unwrap();
            assert_eq!(loaded.signing.secret_bytes(), recomputed.secret_bytes());
        }
    }

    #[test]
    fn test_user_peer_key_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = KeyVault::open(dir.path()).unwrap();

        let key = KeyVault::derive_peer_key(&phrase()).unwrap();
        vault.persist_user_peer_key("EUSER", &key).unwrap();

        let loaded = vault.load_user_peer_key("EUSER").unwrap();
        assert_eq!(loaded.secret_bytes(), key.secret_bytes());

        // Wrong identifier is rejected
        assert!(vault.load_user_peer_key("EOTHER").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_files_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let vault = KeyVault::open(dir.path()).unwrap();
        vault.persist("ESPACE1", &KeySet::generate()).unwrap();

        let mode = fs::metadata(dir.path().join("keys/ESPACE1.keys"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
