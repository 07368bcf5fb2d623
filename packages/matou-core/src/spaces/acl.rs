//! # Access Control
//!
//! Credential-based access policies, translated into invite/join
//! operations on the sync runtime.
//!
//! | Policy | Owner | Members | Required credential schema |
//! |--------|-------|---------|----------------------------|
//! | private | full | none | — |
//! | community | full | read+write | membership |
//! | community-readonly | full | read only | membership |
//! | public | full | anyone reads | — |
//!
//! The policy check is advisory and happens before the SDK-level ACL
//! call: the sync layer's own ACL is updated via invite/join and does not
//! enforce credential validity. Deciding access from credentials is this
//! service's job; the decision is then applied to the ACL.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialSchema;
use crate::error::{Error, Result};
use crate::sync::{Permissions, SyncRuntime};

use super::SpaceType;

/// Credential-based access policy of a space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AclPolicy {
    /// Owner only
    Private,
    /// Members holding a membership credential read and write
    Community,
    /// Members holding a membership credential read
    CommunityReadonly,
    /// Anyone reads
    Public,
}

impl AclPolicy {
    /// The policy governing a space flavour.
    ///
    /// Admin spaces are owner-managed: membership there is invite-only
    /// through the org, so the advisory policy is `private`.
    pub fn for_space_type(space_type: SpaceType) -> Self {
        match space_type {
            SpaceType::Private | SpaceType::Admin => Self::Private,
            SpaceType::Community => Self::Community,
            SpaceType::CommunityReadonly => Self::CommunityReadonly,
        }
    }

    /// The credential schema a member must hold, if any
    pub fn required_schema(&self) -> Option<CredentialSchema> {
        match self {
            Self::Community | Self::CommunityReadonly => Some(CredentialSchema::Membership),
            Self::Private | Self::Public => None,
        }
    }

    /// Permissions an invite under this policy carries
    pub fn member_permissions(&self) -> Permissions {
        match self {
            Self::Private => Permissions::none(),
            Self::Community => Permissions::read_write(),
            Self::CommunityReadonly => Permissions::read_only(),
            Self::Public => Permissions::read_only(),
        }
    }
}

/// Translates policies into runtime invite/join operations
#[derive(Clone)]
pub struct AclManager {
    runtime: Arc<dyn SyncRuntime>,
}

impl AclManager {
    /// Manage ACLs through the given runtime
    pub fn new(runtime: Arc<dyn SyncRuntime>) -> Self {
        Self { runtime }
    }

    /// The permitted operation set for a caller under a policy.
    ///
    /// Advisory: evaluated before any SDK-level ACL change. The sync
    /// layer never checks credentials itself.
    pub fn validate_access(
        policy: AclPolicy,
        is_owner: bool,
        has_matching_credential: bool,
    ) -> Permissions {
        if is_owner {
            return Permissions::full();
        }
        match policy {
            AclPolicy::Private => Permissions::none(),
            AclPolicy::Public => Permissions::read_only(),
            AclPolicy::Community | AclPolicy::CommunityReadonly => {
                if has_matching_credential {
                    policy.member_permissions()
                } else {
                    Permissions::none()
                }
            }
        }
    }

    /// Mint an open invite for a space under a policy.
    ///
    /// Marks the space shareable first (idempotent), then mints an invite
    /// carrying the policy's member permissions. The returned private key
    /// is transported by the client, typically inside a KERI exchange
    /// message. Invites are multi-use at the sync layer; callers rotate
    /// by minting again.
    pub async fn open_invite(&self, space_id: &str, policy: AclPolicy) -> Result<String> {
        if policy == AclPolicy::Private {
            return Err(Error::AccessDenied(format!(
                "Space {} does not admit members",
                space_id
            )));
        }

        self.runtime.make_shareable(space_id).await?;
        self.runtime
            .create_open_invite(space_id, policy.member_permissions())
            .await
    }

    /// Join the local peer to a space with an invite key.
    pub async fn join(&self, space_id: &str, invite_key: &str, metadata: &[u8]) -> Result<()> {
        self.runtime
            .join_with_invite(space_id, invite_key, metadata)
            .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_always_full() {
        for policy in [
            AclPolicy::Private,
            AclPolicy::Community,
            AclPolicy::CommunityReadonly,
            AclPolicy::Public,
        ] {
            assert_eq!(
                AclManager::validate_access(policy, true, false),
                Permissions::full()
            );
        }
    }

    #[test]
    fn test_private_denies_everyone_else() {
        assert_eq!(
            AclManager::validate_access(AclPolicy::Private, false, true),
            Permissions::none()
        );
    }

    #[test]
    fn test_community_requires_credential() {
        assert_eq!(
            AclManager::validate_access(AclPolicy::Community, false, true),
            Permissions::read_write()
        );
        assert_eq!(
            AclManager::validate_access(AclPolicy::Community, false, false),
            Permissions::none()
        );
    }

    #[test]
    fn test_readonly_members_cannot_write() {
        let perms = AclManager::validate_access(AclPolicy::CommunityReadonly, false, true);
        assert!(perms.read);
        assert!(!perms.write);
    }

    #[test]
    fn test_public_reads_without_credential() {
        assert_eq!(
            AclManager::validate_access(AclPolicy::Public, false, false),
            Permissions::read_only()
        );
    }

    #[test]
    fn test_required_schema() {
        assert_eq!(
            AclPolicy::Community.required_schema(),
            Some(CredentialSchema::Membership)
        );
        assert_eq!(AclPolicy::Private.required_schema(), None);
    }

    #[test]
    fn test_policy_for_space_type() {
        assert_eq!(
            AclPolicy::for_space_type(SpaceType::Community),
            AclPolicy::Community
        );
        assert_eq!(
            AclPolicy::for_space_type(SpaceType::Admin),
            AclPolicy::Private
        );
    }
}
