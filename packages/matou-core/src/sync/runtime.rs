//! The runtime contract the rest of the core programs against.

use async_trait::async_trait;

use crate::crypto::{KeySet, SigningKeyPair};
use crate::error::Result;
use crate::spaces::SpaceType;

use super::{Permissions, SpaceHandle, TreeEntry};

/// Operations the core needs from the sync layer
///
/// Every method except [`derive_space_id`](SyncRuntime::derive_space_id)
/// may block on network or disk; callers wrap them in deadlines. The
/// runtime is constructed bound to one peer key and torn down with
/// [`close`](SyncRuntime::close) — instances are never shared across
/// identity swaps.
#[async_trait]
pub trait SyncRuntime: Send + Sync {
    /// Create a space and register it with the coordinator.
    ///
    /// Returns the new space id. Errors: `SpaceExists`,
    /// `CoordinatorUnreachable`.
    async fn create_space(
        &self,
        owner_id: &str,
        space_type: SpaceType,
        key_set: &KeySet,
    ) -> Result<String>;

    /// Deterministically compute a space id without any I/O.
    fn derive_space_id(&self, owner_id: &str, space_type: SpaceType, key_set: &KeySet) -> String {
        super::derive_space_id(owner_id, space_type, key_set)
    }

    /// Get a handle for a space known to the coordinator.
    ///
    /// Errors: `SpaceNotFound`, `CoordinatorUnreachable`.
    async fn get_space(&self, space_id: &str) -> Result<SpaceHandle>;

    /// Mark a space shareable; required before invites can be issued.
    ///
    /// Errors: `NotOwner`.
    async fn make_shareable(&self, space_id: &str) -> Result<()>;

    /// Mint an open invite carrying `permissions`.
    ///
    /// Returns the invite private key, transported out-of-band by the
    /// caller. Errors: `NotShareable`.
    async fn create_open_invite(&self, space_id: &str, permissions: Permissions) -> Result<String>;

    /// Join the caller's peer to a space ACL using an invite key.
    ///
    /// The invite's embedded permissions apply. Errors: `InvalidInvite`,
    /// `AlreadyMember`.
    async fn join_with_invite(
        &self,
        space_id: &str,
        invite_key: &str,
        metadata: &[u8],
    ) -> Result<()>;

    /// Append a payload to the space tree; replicated eventually.
    ///
    /// Returns the change id. Errors: `SpaceClosed`.
    async fn tree_append(
        &self,
        space_id: &str,
        payload: &[u8],
        signing_key: &SigningKeyPair,
    ) -> Result<String>;

    /// Materialise the current tree into its entry sequence.
    ///
    /// Errors: `SpaceClosed`.
    async fn tree_read(&self, space_id: &str) -> Result<Vec<TreeEntry>>;

    /// Tear the runtime down. Further calls fail with
    /// `RuntimeUnavailable`.
    async fn close(&self) -> Result<()>;
}
