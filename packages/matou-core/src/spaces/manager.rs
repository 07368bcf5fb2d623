//! # Space Manager
//!
//! Orchestrates space lifecycle and credential routing across the four
//! space flavours.
//!
//! ## Credential routing
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  route_credential(cred, recipient)                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  1. schema → destination set (schema dispatch table)                │
//! │     membership/steward   → private + community                      │
//! │     invitation/endorse   → private + community                      │
//! │     self-claim           → private only                             │
//! │     revocation           → private + community + readonly           │
//! │  2. cache the credential (SAID-deduplicated)                        │
//! │  3. append to each destination that exists on this node;            │
//! │     a missing destination is skipped silently (filled on the        │
//! │     next recovery), a failing one does not stop the rest            │
//! │  4. invalidate the trust graph, broadcast credential-received       │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Space creation is idempotent by deterministic id: the same mnemonic
//! and owner always derive the same space, so recovery is a lookup, not
//! a mutation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::credentials::{route_for, Credential, CredentialSchema, Destination};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus, EventType};
use crate::identity::{IdentityStore, RecoveryPhrase};
use crate::storage::Database;
use crate::sync::{CredentialTree, SyncRuntime};
use crate::trust::TrustService;
use crate::vault::KeyVault;

use super::{AclManager, AclPolicy, SpaceStore, SpaceType};

/// Deadlines for runtime operations
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    /// Coordinator operations (create, get, invite, join)
    pub coordinator: Duration,
    /// Tree operations (append, read)
    pub tree: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            coordinator: Duration::from_secs(60),
            tree: Duration::from_secs(30),
        }
    }
}

/// Per-destination result of one routing call
#[derive(Debug, Clone, Serialize)]
pub struct RouteFailure {
    /// Destination space that failed
    pub space_id: String,
    /// What went wrong
    pub error: String,
}

/// Outcome of `route_credential`: the operation as a whole succeeds if at
/// least one destination did.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RouteOutcome {
    /// Space ids the credential reached
    pub synced: Vec<String>,
    /// Destinations that failed, with reasons
    pub failed: Vec<RouteFailure>,
}

/// Orchestrates spaces, invites, and credential routing
pub struct SpaceManager {
    runtime: Arc<dyn SyncRuntime>,
    vault: Arc<KeyVault>,
    store: SpaceStore,
    db: Database,
    identity: Arc<IdentityStore>,
    trust: Arc<TrustService>,
    events: Arc<EventBus>,
    tree: CredentialTree,
    acl: AclManager,
    deadlines: Deadlines,
}

impl std::fmt::Debug for SpaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceManager").finish_non_exhaustive()
    }
}

impl SpaceManager {
    /// Wire the manager over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runtime: Arc<dyn SyncRuntime>,
        vault: Arc<KeyVault>,
        store: SpaceStore,
        db: Database,
        identity: Arc<IdentityStore>,
        trust: Arc<TrustService>,
        events: Arc<EventBus>,
        deadlines: Deadlines,
    ) -> Self {
        Self {
            tree: CredentialTree::new(Arc::clone(&runtime)),
            acl: AclManager::new(Arc::clone(&runtime)),
            runtime,
            vault,
            store,
            db,
            identity,
            trust,
            events,
            deadlines,
        }
    }

    fn phrase(&self) -> Result<RecoveryPhrase> {
        let record = self.identity.require()?;
        RecoveryPhrase::from_phrase(&record.mnemonic)
    }

    async fn with_deadline<T>(
        &self,
        deadline: Duration,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| Error::Timeout(what.to_string()))?
    }

    // ========================================================================
    // SPACE LIFECYCLE
    // ========================================================================

    /// Create (or recover) a space of `space_type` for `owner_id`.
    ///
    /// Derives the key set from the identity mnemonic, overrides the
    /// signing key with the peer key, and either recovers the space by
    /// its deterministic id or creates it. The key set is persisted on
    /// both paths so a freshly generated read key survives.
    async fn create_or_recover(&self, owner_id: &str, space_type: SpaceType) -> Result<String> {
        let phrase = self.phrase()?;
        let peer_key = KeyVault::derive_peer_key(&phrase)?;
        let mut key_set = KeyVault::derive_space_key_set(&phrase, space_type.key_index())?;
        key_set.override_signing(&peer_key);

        let space_id = self.runtime.derive_space_id(owner_id, space_type, &key_set);

        // The read key has no derivation path; a previously persisted one
        // is the only key that decrypts existing tree content
        if self.vault.has_key_set(&space_id) {
            key_set.read = self.vault.load(&space_id)?.read;
        }

        let recovered = match self
            .with_deadline(
                self.deadlines.coordinator,
                "get_space",
                self.runtime.get_space(&space_id),
            )
            .await
        {
            Ok(_) => true,
            Err(Error::SpaceNotFound(_)) => {
                // No partial local state is written if the create fails
                self.with_deadline(
                    self.deadlines.coordinator,
                    "create_space",
                    self.runtime.create_space(owner_id, space_type, &key_set),
                )
                .await?;
                false
            }
            Err(e) => return Err(e),
        };

        self.vault.persist(&space_id, &key_set)?;
        self.store.record(&space_id, owner_id, space_type)?;

        self.events.broadcast(Event::new(
            EventType::SpaceUpdated,
            serde_json::json!({
                "spaceId": space_id,
                "spaceType": space_type.as_str(),
                "ownerId": owner_id,
                "recovered": recovered,
            }),
        ));

        tracing::info!(
            space_id = space_id.as_str(),
            space_type = %space_type,
            recovered,
            "Space ready"
        );
        Ok(space_id)
    }

    /// Create the org community space and make it shareable.
    ///
    /// Idempotent by deterministic id.
    pub async fn create_community_space(&self, org_id: &str, org_name: &str) -> Result<String> {
        let space_id = self.create_or_recover(org_id, SpaceType::Community).await?;

        self.with_deadline(
            self.deadlines.coordinator,
            "make_shareable",
            self.runtime.make_shareable(&space_id),
        )
        .await?;

        tracing::info!(org = org_name, space_id = space_id.as_str(), "Community space ready");
        Ok(space_id)
    }

    /// Create the user's private space. Idempotent by deterministic id.
    pub async fn create_private_space(&self, user_id: &str) -> Result<String> {
        self.create_or_recover(user_id, SpaceType::Private).await
    }

    /// Look the private space up by deterministic id; create only when
    /// the coordinator reports it unknown.
    pub async fn get_or_create_private_space(&self, user_id: &str) -> Result<String> {
        if let Some(record) = self.store.get_user_space(user_id)? {
            match self
                .with_deadline(
                    self.deadlines.coordinator,
                    "get_space",
                    self.runtime.get_space(&record.space_id),
                )
                .await
            {
                Ok(_) => return Ok(record.space_id),
                Err(Error::SpaceNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.create_private_space(user_id).await
    }

    // ========================================================================
    // INVITES
    // ========================================================================

    /// Mint an open invite into the community space for a member holding
    /// a membership credential.
    ///
    /// The returned key is transported by the caller via a KERI exchange
    /// message. A fresh invite is minted per call; used keys are never
    /// reissued.
    pub async fn invite_to_community(
        &self,
        user_id: &str,
        credential_said: &str,
    ) -> Result<String> {
        let cred = self
            .db
            .get_credential(credential_said)?
            .ok_or_else(|| Error::CredentialNotFound(credential_said.to_string()))?;

        if cred.schema() != CredentialSchema::Membership {
            return Err(Error::InvalidCredential(format!(
                "Invites require a membership credential, got schema '{}'",
                cred.schema().name()
            )));
        }
        if cred.recipient_id != user_id {
            return Err(Error::InvalidCredential(format!(
                "Credential {} was not issued to {}",
                credential_said, user_id
            )));
        }

        let community_id = self
            .identity
            .require()?
            .community_space_id
            .ok_or(Error::OrgNotConfigured)?;

        self.with_deadline(
            self.deadlines.coordinator,
            "create_open_invite",
            self.acl.open_invite(&community_id, AclPolicy::Community),
        )
        .await
    }

    /// Join the local peer to a community space with an invite key.
    pub async fn join_community(
        &self,
        space_id: &str,
        invite_key: &str,
        metadata: &[u8],
    ) -> Result<()> {
        self.with_deadline(
            self.deadlines.coordinator,
            "join_with_invite",
            self.acl.join(space_id, invite_key, metadata),
        )
        .await?;

        self.events.broadcast(Event::new(
            EventType::SpaceUpdated,
            serde_json::json!({ "spaceId": space_id, "joined": true }),
        ));
        Ok(())
    }

    /// Advisory access check for the community space: does `user_id` hold
    /// a membership credential in the cache?
    pub fn verify_community_access(&self, user_id: &str) -> Result<bool> {
        let creds = self.db.get_credentials_for(user_id)?;
        Ok(creds
            .iter()
            .any(|c| c.schema() == CredentialSchema::Membership))
    }

    // ========================================================================
    // CREDENTIAL ROUTING
    // ========================================================================

    /// Resolve a routing destination to a concrete space id, if this node
    /// knows one.
    fn resolve_destination(&self, dest: Destination, recipient_id: &str) -> Result<Option<String>> {
        match dest {
            Destination::Private => Ok(self
                .store
                .get_user_space(recipient_id)?
                .map(|r| r.space_id)),
            Destination::Community => Ok(self.identity.get().and_then(|r| r.community_space_id)),
            Destination::CommunityReadonly => {
                Ok(self.identity.get().and_then(|r| r.readonly_space_id))
            }
        }
    }

    /// Route a credential into every destination space its schema names.
    ///
    /// Destinations this node does not know are skipped silently; a
    /// failing append does not stop the remaining destinations. After all
    /// appends the trust graph cache is invalidated and a
    /// `credential-received` event is broadcast.
    pub async fn route_credential(
        &self,
        cred: &Credential,
        recipient_id: &str,
    ) -> Result<RouteOutcome> {
        let route = route_for(cred.schema());

        // The cache feeds the trust graph regardless of destinations
        self.db.insert_credential(cred)?;

        let phrase = self.phrase()?;
        let peer_key = KeyVault::derive_peer_key(&phrase)?;

        let mut outcome = RouteOutcome::default();
        for dest in route.destinations {
            let space_id = match self.resolve_destination(*dest, recipient_id)? {
                Some(id) => id,
                None => continue,
            };

            let append = self
                .with_deadline(
                    self.deadlines.tree,
                    "tree_append",
                    self.tree.add_credential(&space_id, cred, &peer_key),
                )
                .await;

            match append {
                Ok(_) => outcome.synced.push(space_id),
                Err(e) => {
                    tracing::warn!(
                        space_id = space_id.as_str(),
                        said = cred.said.as_str(),
                        error = %e,
                        "Credential append failed"
                    );
                    outcome.failed.push(RouteFailure {
                        space_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.trust.invalidate();
        self.events.broadcast(Event::new(
            EventType::CredentialReceived,
            serde_json::json!({
                "said": cred.said,
                "issuer": cred.issuer_id,
                "recipient": cred.recipient_id,
                "schema": cred.schema().name(),
            }),
        ));

        Ok(outcome)
    }

    /// Read the materialised credentials of one space.
    pub async fn read_space_credentials(&self, space_id: &str) -> Result<Vec<Credential>> {
        self.with_deadline(
            self.deadlines.tree,
            "tree_read",
            self.tree.read_credentials(space_id),
        )
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================
