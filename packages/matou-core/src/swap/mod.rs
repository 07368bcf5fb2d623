//! # Identity Swapper
//!
//! Atomic re-key of the running service when the user's identity changes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      SWAP STATE MACHINE                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  idle ─► deriving ─► persisting-identity ─► flushing-runtime        │
//! │                 │                                │                  │
//! │   invalid mnemonic:                              ▼                  │
//! │   fail with NO disk                    reloading-runtime            │
//! │   changes                                        │                  │
//! │                                                  ▼                  │
//! │                                        recovering-spaces ─► idle    │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - A close error while flushing is logged and ignored; the old handle
//!   is discarded either way.
//! - If reloading fails the service is left with no runtime; space
//!   operations return `RuntimeUnavailable` until the next swap.
//! - Recovery derives each core space id from the new key set and calls
//!   `get_space`. The private space is created when unknown; org-owned
//!   spaces are only ever recovered, never created.
//! - The swapper is not concurrent with itself: re-entry is rejected
//!   with `busy`, even for an identical mnemonic.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::crypto::PeerId;
use crate::error::{Error, Result};
use crate::identity::{IdentityRecord, IdentityStore, RecoveryPhrase};
use crate::spaces::{SpaceStore, SpaceType};
use crate::storage::Database;
use crate::sync::{EmbeddedRuntime, SyncRuntime};
use crate::time::now_timestamp;
use crate::vault::KeyVault;

/// What the client declares on an identity-set request
#[derive(Debug, Clone)]
pub struct SwapRequest {
    /// The user's KERI identifier
    pub aid: String,
    /// The new mnemonic
    pub mnemonic: String,
    /// Organisation identifier, if joined
    pub org_aid: Option<String>,
    /// Coordinator-known community space id, if declared
    pub community_space_id: Option<String>,
    /// Coordinator-known read-only space id, if declared
    pub readonly_space_id: Option<String>,
    /// Coordinator-known admin space id (admins only)
    pub admin_space_id: Option<String>,
    /// Membership credential presented at registration
    pub credential_said: Option<String>,
}

/// Result of a completed swap
pub struct SwapResult {
    /// Peer id of the new identity
    pub peer_id: PeerId,
    /// The (created or recovered) private space
    pub private_space_id: String,
    /// Runtime bound to the new peer key; replaces the flushed one
    pub runtime: Arc<dyn SyncRuntime>,
    /// Org spaces recovered with fresh key sets
    pub recovered: Vec<(SpaceType, String)>,
}

/// Serialises identity re-keying
pub struct IdentitySwapper {
    data_dir: PathBuf,
    vault: Arc<KeyVault>,
    identity: Arc<IdentityStore>,
    store: SpaceStore,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a swap ends, on every path.
struct Flight<'a>(&'a AtomicBool);

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl IdentitySwapper {
    /// Wire the swapper over its collaborators.
    pub fn new(
        data_dir: PathBuf,
        vault: Arc<KeyVault>,
        identity: Arc<IdentityStore>,
        db: Database,
    ) -> Self {
        Self {
            data_dir,
            vault,
            identity,
            store: SpaceStore::new(db),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run the full swap.
    ///
    /// `old_runtime` is the instance to flush; `None` on first boot.
    pub async fn swap(
        &self,
        old_runtime: Option<Arc<dyn SyncRuntime>>,
        request: SwapRequest,
    ) -> Result<SwapResult> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::SwapInProgress);
        }
        let _flight = Flight(&self.in_flight);

        // deriving — fatal on a bad mnemonic, nothing touched on disk
        let phrase = RecoveryPhrase::from_phrase(&request.mnemonic)?;
        let peer_key = KeyVault::derive_peer_key(&phrase)?;
        let peer_id = peer_key.peer_id();

        // The previous private space is abandoned if the peer changes
        let previous = self.identity.get();

        // persisting-identity
        self.identity.set(IdentityRecord {
            aid: request.aid.clone(),
            mnemonic: request.mnemonic.clone(),
            peer_id: peer_id.to_string(),
            org_aid: request.org_aid.clone(),
            private_space_id: None,
            community_space_id: request.community_space_id.clone(),
            readonly_space_id: request.readonly_space_id.clone(),
            admin_space_id: request.admin_space_id.clone(),
            credential_said: request.credential_said.clone(),
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        })?;
        self.vault.persist_user_peer_key(&request.aid, &peer_key)?;

        // flushing-runtime — a close error discards the handle anyway
        if let Some(runtime) = old_runtime {
            if let Err(e) = runtime.close().await {
                tracing::warn!(error = %e, "Old runtime close failed; discarding handle");
            }
        }

        // reloading-runtime — on failure the caller holds no runtime
        let runtime: Arc<dyn SyncRuntime> =
            Arc::new(EmbeddedRuntime::new(&self.data_dir, peer_key.duplicate())?);

        // recovering-spaces
        if let Some(prev) = previous {
            if prev.peer_id != peer_id.to_string() {
                if let Some(old_private) = prev.private_space_id {
                    self.store.remove(&old_private)?;
                    tracing::info!(space_id = old_private.as_str(), "Abandoned previous private space");
                }
            }
        }

        let private_space_id = self
            .recover_space(&runtime, &phrase, &request.aid, SpaceType::Private, true)
            .await?
            .ok_or_else(|| Error::Internal("Private space recovery produced no id".into()))?;
        self.identity
            .update(|rec| rec.private_space_id = Some(private_space_id.clone()))?;

        let mut recovered = Vec::new();
        if let Some(org_aid) = &request.org_aid {
            for space_type in [
                SpaceType::Community,
                SpaceType::CommunityReadonly,
                SpaceType::Admin,
            ] {
                if space_type == SpaceType::Admin && request.admin_space_id.is_none() {
                    continue;
                }
                if let Some(space_id) = self
                    .recover_space(&runtime, &phrase, org_aid, space_type, false)
                    .await?
                {
                    self.record_org_space(space_type, &space_id)?;
                    recovered.push((space_type, space_id));
                }
            }
        }

        tracing::info!(aid = request.aid.as_str(), peer_id = %peer_id, "Identity swap complete");
        Ok(SwapResult {
            peer_id,
            private_space_id,
            runtime,
            recovered,
        })
    }

    /// Derive the space id from the new key set and try to recover it.
    ///
    /// Found: the fresh key set (signing-key override applied) is
    /// persisted and the space recorded. Not found: created only when
    /// `create_if_missing` (the private space); org-owned spaces are
    /// never created here.
    async fn recover_space(
        &self,
        runtime: &Arc<dyn SyncRuntime>,
        phrase: &RecoveryPhrase,
        owner_id: &str,
        space_type: SpaceType,
        create_if_missing: bool,
    ) -> Result<Option<String>> {
        let peer_key = KeyVault::derive_peer_key(phrase)?;
        let mut key_set = KeyVault::derive_space_key_set(phrase, space_type.key_index())?;
        key_set.override_signing(&peer_key);

        let space_id = runtime.derive_space_id(owner_id, space_type, &key_set);

        // Keep a previously persisted read key; only it decrypts the
        // space's existing tree content
        if self.vault.has_key_set(&space_id) {
            key_set.read = self.vault.load(&space_id)?.read;
        }

        match runtime.get_space(&space_id).await {
            Ok(_) => {
                self.vault.persist(&space_id, &key_set)?;
                self.store.record(&space_id, owner_id, space_type)?;
                Ok(Some(space_id))
            }
            Err(Error::SpaceNotFound(_)) if create_if_missing => {
                runtime.create_space(owner_id, space_type, &key_set).await?;
                self.vault.persist(&space_id, &key_set)?;
                self.store.record(&space_id, owner_id, space_type)?;
                Ok(Some(space_id))
            }
            Err(Error::SpaceNotFound(_)) => {
                tracing::debug!(
                    space_id = space_id.as_str(),
                    space_type = %space_type,
                    "Org space not recoverable from this key set"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn record_org_space(&self, space_type: SpaceType, space_id: &str) -> Result<()> {
        let id = space_id.to_string();
        self.identity.update(|rec| match space_type {
            SpaceType::Community => rec.community_space_id = Some(id.clone()),
            SpaceType::CommunityReadonly => rec.readonly_space_id = Some(id.clone()),
            SpaceType::Admin => rec.admin_space_id = Some(id.clone()),
            SpaceType::Private => {}
        })?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const M1: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const M2: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn swapper(dir: &std::path::Path) -> (IdentitySwapper, Arc<IdentityStore>, Database) {
        let vault = Arc::new(KeyVault::open(dir).unwrap());
        let identity = Arc::new(IdentityStore::open(dir).unwrap());
        let db = Database::open(None).unwrap();
        (
            IdentitySwapper::new(dir.to_path_buf(), vault, Arc::clone(&identity), db.clone()),
            identity,
            db,
        )
    }

    fn request(mnemonic: &str) -> SwapRequest {
        SwapRequest {
            aid: "EUSER1".into(),
            mnemonic: mnemonic.into(),
            org_aid: None,
            community_space_id: None,
            readonly_space_id: None,
            admin_space_id: None,
            credential_said: None,
        }
    }

    #[tokio::test]
    async fn test_invalid_mnemonic_leaves_no_state() {
        let dir = tempfile::tempdir().unwrap();
        let (swapper, identity, _db) = swapper(dir.path());

        let mut req = request(M1);
        req.mnemonic = "not a mnemonic".into();
        assert!(swapper.swap(None, req).await.is_err());

        assert!(!identity.is_configured());
        assert!(!dir.path().join("identity.json").exists());
        assert!(!dir.path().join("peer.key").exists());
    }

    #[tokio::test]
    async fn test_first_swap_creates_private_space() {
        let dir = tempfile::tempdir().unwrap();
        let (swapper, identity, _db) = swapper(dir.path());

        let result = swapper.swap(None, request(M1)).await.unwrap();

        let record = identity.require().unwrap();
        assert_eq!(record.peer_id, result.peer_id.to_string());
        assert_eq!(
            record.private_space_id.as_deref(),
            Some(result.private_space_id.as_str())
        );
        assert!(dir.path().join("peer.key").exists());
    }

    #[tokio::test]
    async fn test_swap_with_same_mnemonic_recovers_same_space() {
        let dir = tempfile::tempdir().unwrap();
        let (swapper, _identity, _db) = swapper(dir.path());

        let first = swapper.swap(None, request(M1)).await.unwrap();
        let second = swapper
            .swap(Some(Arc::clone(&first.runtime)), request(M1))
            .await
            .unwrap();

        assert_eq!(first.peer_id, second.peer_id);
        assert_eq!(first.private_space_id, second.private_space_id);
    }

    #[tokio::test]
    async fn test_rekey_changes_peer_and_private_space() {
        let dir = tempfile::tempdir().unwrap();
        let (swapper, identity, db) = swapper(dir.path());

        let first = swapper.swap(None, request(M1)).await.unwrap();
        let second = swapper
            .swap(Some(Arc::clone(&first.runtime)), request(M2))
            .await
            .unwrap();

        assert_ne!(first.peer_id, second.peer_id);
        assert_ne!(first.private_space_id, second.private_space_id);

        // The old private space no longer appears among the user's spaces
        let store = SpaceStore::new(db);
        assert!(store.get(&first.private_space_id).unwrap().is_none());
        assert_eq!(
            store.get_user_space("EUSER1").unwrap().unwrap().space_id,
            second.private_space_id
        );

        // identity.json reflects the new peer key
        let phrase = RecoveryPhrase::from_phrase(M2).unwrap();
        let expected = KeyVault::derive_peer_key(&phrase).unwrap().peer_id();
        assert_eq!(identity.require().unwrap().peer_id, expected.to_string());
    }

    #[tokio::test]
    async fn test_old_runtime_is_flushed() {
        let dir = tempfile::tempdir().unwrap();
        let (swapper, _identity, _db) = swapper(dir.path());

        let first = swapper.swap(None, request(M1)).await.unwrap();
        let old = Arc::clone(&first.runtime);
        swapper.swap(Some(first.runtime), request(M2)).await.unwrap();

        assert!(matches!(
            old.get_space("EANY").await.unwrap_err(),
            Error::RuntimeUnavailable
        ));
    }

    #[tokio::test]
    async fn test_org_spaces_never_created() {
        let dir = tempfile::tempdir().unwrap();
        let (swapper, identity, _db) = swapper(dir.path());

        let mut req = request(M1);
        req.org_aid = Some("EORG123".into());
        let result = swapper.swap(None, req).await.unwrap();

        // No org space exists on the coordinator, so none is recovered
        assert!(result.recovered.is_empty());
        // The declared ids pass through unchanged (none declared here)
        assert!(identity.require().unwrap().community_space_id.is_none());
    }

    #[tokio::test]
    async fn test_declared_org_space_ids_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (swapper, identity, _db) = swapper(dir.path());

        let mut req = request(M1);
        req.org_aid = Some("EORG123".into());
        req.community_space_id = Some("ECOMMUNITY".into());
        req.readonly_space_id = Some("EREADONLY".into());
        swapper.swap(None, req).await.unwrap();

        let record = identity.require().unwrap();
        assert_eq!(record.community_space_id.as_deref(), Some("ECOMMUNITY"));
        assert_eq!(record.readonly_space_id.as_deref(), Some("EREADONLY"));
    }
}
