//! Embedded sync runtime.
//!
//! A local implementation of the [`SyncRuntime`] contract backed by
//! per-space directories under `{data_dir}/spaces/{space_id}/`:
//!
//! ```text
//! space.json    space header (owner, type, signing pub, shareable)
//! space.key     the space read key (mode 0600)
//! tree.log      append-only JSON lines; payloads AES-GCM encrypted
//! invites.json  open invite records (sealed read key per invite)
//! members.json  ACL entries joined via invites
//! ```
//!
//! Tree payloads are encrypted with the space read key and signed with
//! the appender's signing key, the same shape the coordinator-backed
//! runtime replicates. Change ids are content addresses (SHA-256 of the
//! plaintext payload), so replaying an append converges on one entry.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::kdf::domain;
use crate::crypto::{KeySet, ReadKey, SigningKeyPair};
use crate::error::{Error, Result};
use crate::spaces::SpaceType;
use crate::time::now_timestamp;

use super::{Permissions, SpaceHandle, SyncRuntime, TreeEntry};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Persisted space header
#[derive(Serialize, Deserialize)]
struct SpaceMeta {
    space_id: String,
    owner_id: String,
    space_type: SpaceType,
    /// Hex public half of the space signing key
    signing_pub: String,
    shareable: bool,
    created_at: i64,
}

/// Persisted read key
#[derive(Serialize, Deserialize)]
struct SpaceKeyFile {
    read: String,
}

/// One open invite
#[derive(Serialize, Deserialize)]
struct InviteRecord {
    /// Hex public half of the invite key
    invite_pub: String,
    permissions: Permissions,
    /// Space read key sealed to the invite key
    sealed_read_key: String,
    created_at: i64,
}

/// One ACL entry
#[derive(Serialize, Deserialize)]
struct MemberRecord {
    peer_id: String,
    permissions: Permissions,
    /// Opaque caller-provided metadata
    metadata: String,
    joined_at: i64,
}

/// One tree log line
#[derive(Serialize, Deserialize)]
struct TreeRecord {
    change_id: String,
    /// AES-GCM sealed payload
    ciphertext: String,
    /// Ed25519 signature over the ciphertext
    signature: String,
    /// Hex public half of the signer
    signer: String,
    appended_at: i64,
}

/// Local [`SyncRuntime`] bound to one peer key
pub struct EmbeddedRuntime {
    spaces_dir: PathBuf,
    peer_key: SigningKeyPair,
    closed: AtomicBool,
}

impl EmbeddedRuntime {
    /// Construct a runtime storing spaces under `{data_dir}/spaces/`.
    pub fn new(data_dir: &Path, peer_key: SigningKeyPair) -> Result<Self> {
        let spaces_dir = data_dir.join("spaces");
        fs::create_dir_all(&spaces_dir)
            .map_err(|e| Error::StorageWrite(format!("{}: {}", spaces_dir.display(), e)))?;

        Ok(Self {
            spaces_dir,
            peer_key,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::RuntimeUnavailable);
        }
        Ok(())
    }

    fn space_dir(&self, space_id: &str) -> PathBuf {
        self.spaces_dir.join(space_id)
    }

    fn load_meta(&self, space_id: &str) -> Result<SpaceMeta> {
        let path = self.space_dir(space_id).join("space.json");
        if !path.exists() {
            return Err(Error::SpaceNotFound(space_id.to_string()));
        }
        read_json(&path)
    }

    fn store_meta(&self, meta: &SpaceMeta) -> Result<()> {
        write_json(&self.space_dir(&meta.space_id).join("space.json"), meta, false)
    }

    fn load_read_key(&self, space_id: &str) -> Result<ReadKey> {
        let file: SpaceKeyFile = read_json(&self.space_dir(space_id).join("space.key"))?;
        let bytes = hex::decode(&file.read)
            .map_err(|e| Error::Corrupted(format!("space.key: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Corrupted("space.key has wrong length".into()))?;
        Ok(ReadKey::from_bytes(bytes))
    }

    fn load_list<T: serde::de::DeserializeOwned>(&self, space_id: &str, file: &str) -> Result<Vec<T>> {
        let path = self.space_dir(space_id).join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json(&path)
    }

    fn store_list<T: Serialize>(&self, space_id: &str, file: &str, list: &[T]) -> Result<()> {
        write_json(&self.space_dir(space_id).join(file), &list, false)
    }
}

#[async_trait]
impl SyncRuntime for EmbeddedRuntime {
    async fn create_space(
        &self,
        owner_id: &str,
        space_type: SpaceType,
        key_set: &KeySet,
    ) -> Result<String> {
        self.ensure_open()?;

        let space_id = self.derive_space_id(owner_id, space_type, key_set);
        let dir = self.space_dir(&space_id);
        if dir.exists() {
            return Err(Error::SpaceExists(space_id));
        }

        fs::create_dir_all(&dir)
            .map_err(|e| Error::CoordinatorUnreachable(format!("{}: {}", dir.display(), e)))?;

        let meta = SpaceMeta {
            space_id: space_id.clone(),
            owner_id: owner_id.to_string(),
            space_type,
            signing_pub: hex::encode(key_set.signing.public_bytes()),
            shareable: false,
            created_at: now_timestamp(),
        };
        self.store_meta(&meta)?;

        write_json(
            &dir.join("space.key"),
            &SpaceKeyFile {
                read: hex::encode(key_set.read.secret_bytes()),
            },
            true,
        )?;

        fs::File::create(dir.join("tree.log"))
            .map_err(|e| Error::StorageWrite(format!("tree.log: {}", e)))?;

        tracing::info!(space_id = space_id.as_str(), space_type = %space_type, "Space created");
        Ok(space_id)
    }

    async fn get_space(&self, space_id: &str) -> Result<SpaceHandle> {
        self.ensure_open()?;
        let meta = self.load_meta(space_id)?;

        Ok(SpaceHandle {
            space_id: meta.space_id,
            owner_id: meta.owner_id,
            space_type: meta.space_type,
            shareable: meta.shareable,
        })
    }

    async fn make_shareable(&self, space_id: &str) -> Result<()> {
        self.ensure_open()?;
        let mut meta = self.load_meta(space_id)?;

        if meta.signing_pub != hex::encode(self.peer_key.public_bytes()) {
            return Err(Error::NotOwner(space_id.to_string()));
        }

        if !meta.shareable {
            meta.shareable = true;
            self.store_meta(&meta)?;
        }
        Ok(())
    }

    async fn create_open_invite(&self, space_id: &str, permissions: Permissions) -> Result<String> {
        self.ensure_open()?;
        let meta = self.load_meta(space_id)?;
        if !meta.shareable {
            return Err(Error::NotShareable(space_id.to_string()));
        }

        let read_key = self.load_read_key(space_id)?;
        let invite_key = SigningKeyPair::generate();

        let seal_key = invite_seal_key(&invite_key.secret_bytes())?;
        let sealed = seal_key.encrypt(&read_key.secret_bytes(), space_id.as_bytes())?;

        let mut invites: Vec<InviteRecord> = self.load_list(space_id, "invites.json")?;
        invites.push(InviteRecord {
            invite_pub: hex::encode(invite_key.public_bytes()),
            permissions,
            sealed_read_key: B64.encode(&sealed),
            created_at: now_timestamp(),
        });
        self.store_list(space_id, "invites.json", &invites)?;

        tracing::info!(space_id = space_id, "Open invite minted");
        Ok(B64.encode(invite_key.secret_bytes()))
    }

    async fn join_with_invite(
        &self,
        space_id: &str,
        invite_key: &str,
        metadata: &[u8],
    ) -> Result<()> {
        self.ensure_open()?;
        self.load_meta(space_id)?;

        let secret: [u8; 32] = B64
            .decode(invite_key)
            .map_err(|e| Error::InvalidInvite(format!("Bad encoding: {}", e)))?
            .try_into()
            .map_err(|_| Error::InvalidInvite("Invite key has wrong length".into()))?;
        let presented = SigningKeyPair::from_bytes(&secret);
        let presented_pub = hex::encode(presented.public_bytes());

        let invites: Vec<InviteRecord> = self.load_list(space_id, "invites.json")?;
        let record = invites
            .iter()
            .find(|r| r.invite_pub == presented_pub)
            .ok_or_else(|| Error::InvalidInvite("No matching invite record".into()))?;

        // Unsealing proves the private key decrypts this invite's read key
        let seal_key = invite_seal_key(&secret)?;
        let sealed = B64
            .decode(&record.sealed_read_key)
            .map_err(|e| Error::Corrupted(format!("invites.json: {}", e)))?;
        seal_key.decrypt(&sealed, space_id.as_bytes())?;

        let peer_id = self.peer_key.peer_id().to_string();
        let mut members: Vec<MemberRecord> = self.load_list(space_id, "members.json")?;
        if members.iter().any(|m| m.peer_id == peer_id) {
            return Err(Error::AlreadyMember(space_id.to_string()));
        }

        members.push(MemberRecord {
            peer_id,
            permissions: record.permissions,
            metadata: B64.encode(metadata),
            joined_at: now_timestamp(),
        });
        self.store_list(space_id, "members.json", &members)?;

        tracing::info!(space_id = space_id, "Joined space via invite");
        Ok(())
    }

    async fn tree_append(
        &self,
        space_id: &str,
        payload: &[u8],
        signing_key: &SigningKeyPair,
    ) -> Result<String> {
        self.ensure_open()?;
        self.load_meta(space_id)?;

        let log_path = self.space_dir(space_id).join("tree.log");
        if !log_path.exists() {
            return Err(Error::SpaceClosed(space_id.to_string()));
        }

        let change_id = hex::encode(Sha256::digest(payload));

        // Content-addressed: replaying the same payload converges
        for entry in self.read_log(space_id, &log_path)? {
            if entry.change_id == change_id {
                return Ok(change_id);
            }
        }

        let read_key = self.load_read_key(space_id)?;
        let ciphertext = read_key.encrypt(payload, space_id.as_bytes())?;
        let signature = signing_key.sign(&ciphertext);

        let record = TreeRecord {
            change_id: change_id.clone(),
            ciphertext: B64.encode(&ciphertext),
            signature: B64.encode(signature.to_bytes()),
            signer: hex::encode(signing_key.public_bytes()),
            appended_at: now_timestamp(),
        };

        let line = serde_json::to_string(&record)?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .map_err(|e| Error::TreeAppendFailed(format!("{}: {}", log_path.display(), e)))?;
        writeln!(file, "{}", line)
            .map_err(|e| Error::TreeAppendFailed(format!("{}: {}", log_path.display(), e)))?;
        file.sync_all()
            .map_err(|e| Error::TreeAppendFailed(format!("{}: {}", log_path.display(), e)))?;

        Ok(change_id)
    }

    async fn tree_read(&self, space_id: &str) -> Result<Vec<TreeEntry>> {
        self.ensure_open()?;
        self.load_meta(space_id)?;

        let log_path = self.space_dir(space_id).join("tree.log");
        if !log_path.exists() {
            return Err(Error::SpaceClosed(space_id.to_string()));
        }

        let read_key = self.load_read_key(space_id)?;
        let mut entries = Vec::new();
        for record in self.read_log(space_id, &log_path)? {
            let ciphertext = B64
                .decode(&record.ciphertext)
                .map_err(|e| Error::Corrupted(format!("tree.log: {}", e)))?;
            let payload = read_key.decrypt(&ciphertext, space_id.as_bytes())?;
            entries.push(TreeEntry {
                change_id: record.change_id,
                payload,
            });
        }
        Ok(entries)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!("Sync runtime closed");
        Ok(())
    }
}

impl EmbeddedRuntime {
    fn read_log(&self, _space_id: &str, log_path: &Path) -> Result<Vec<TreeRecord>> {
        let raw = fs::read_to_string(log_path)
            .map_err(|e| Error::StorageRead(format!("{}: {}", log_path.display(), e)))?;

        let mut records = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(
                serde_json::from_str(line)
                    .map_err(|e| Error::Corrupted(format!("{}: {}", log_path.display(), e)))?,
            );
        }
        Ok(records)
    }
}

/// Derive the AEAD key sealing a read key to an invite key.
fn invite_seal_key(invite_secret: &[u8; 32]) -> Result<ReadKey> {
    let hkdf = Hkdf::<Sha256>::new(None, invite_secret);
    let mut key = [0u8; 32];
    hkdf.expand(domain::INVITE_SEAL, &mut key)
        .map_err(|_| Error::KeyDerivationFailed("Invite seal key derivation failed".into()))?;
    Ok(ReadKey::from_bytes(key))
}

// ============================================================================
// FILE HELPERS
// ============================================================================

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::StorageRead(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| Error::Corrupted(format!("{}: {}", path.display(), e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T, private: bool) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|e| Error::StorageWrite(format!("{}: {}", path.display(), e)))?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::StorageWrite(format!("{}: {}", path.display(), e)))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
