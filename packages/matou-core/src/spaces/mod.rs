//! # Spaces
//!
//! Spaces are the unit of replication: CRDT-replicated containers with
//! their own ACL and key set. This module owns the space model, the
//! durable space store, the credential-based access policies, and the
//! orchestration of space lifecycle and credential routing.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        SPACE FLAVOURS                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  private             user-owned; only the owner reads and writes   │
//! │  community           org-owned; members read and write             │
//! │  community-readonly  org-owned; members read only                  │
//! │  admin               org-owned; administrators only                │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod acl;
pub mod manager;
mod store;

pub use acl::{AclManager, AclPolicy};
pub use manager::{RouteOutcome, SpaceManager};
pub use store::SpaceStore;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Space flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpaceType {
    /// User-owned private space
    Private,
    /// Org-owned writable community space
    Community,
    /// Org-owned read-only space
    CommunityReadonly,
    /// Org-owned admin space
    Admin,
}

impl SpaceType {
    /// Wire/storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Community => "community",
            Self::CommunityReadonly => "community-readonly",
            Self::Admin => "admin",
        }
    }

    /// Parse a wire/storage name
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "private" => Ok(Self::Private),
            "community" => Ok(Self::Community),
            "community-readonly" => Ok(Self::CommunityReadonly),
            "admin" => Ok(Self::Admin),
            other => Err(Error::InvalidIdentifier(format!(
                "Unknown space type '{}'",
                other
            ))),
        }
    }

    /// Key-derivation index of this space type in the seed schedule.
    ///
    /// Fixed per type so the same mnemonic and owner recover the same
    /// key set (and therefore the same space id) after a re-install.
    pub fn key_index(&self) -> u32 {
        match self {
            Self::Private => 0,
            Self::Community => 1,
            Self::CommunityReadonly => 2,
            Self::Admin => 3,
        }
    }
}

impl std::fmt::Display for SpaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_type_round_trip() {
        for t in [
            SpaceType::Private,
            SpaceType::Community,
            SpaceType::CommunityReadonly,
            SpaceType::Admin,
        ] {
            assert_eq!(SpaceType::parse(t.as_str()).unwrap(), t);
        }
        assert!(SpaceType::parse("global").is_err());
    }

    #[test]
    fn test_key_indices_distinct() {
        let indices = [
            SpaceType::Private.key_index(),
            SpaceType::Community.key_index(),
            SpaceType::CommunityReadonly.key_index(),
            SpaceType::Admin.key_index(),
        ];
        for (i, a) in indices.iter().enumerate() {
            for b in &indices[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
