//! # Schema Dispatch
//!
//! The explicit table mapping credential schemas to trust-edge types and
//! routing destinations. Adding a schema is a table edit, not a new code
//! path: every consumer (`SpaceManager` routing, trust-graph building)
//! dispatches through [`route_for`].
//!
//! Schemas are matched by their registry SAID or by their well-known short
//! name — the client sends whichever it has.

use serde::{Deserialize, Serialize};

/// Registry SAIDs of the well-known credential schemas.
pub mod said {
    /// Community membership credential
    pub const MEMBERSHIP: &str = "EBGoJrEkjMAULhJENZv4i5wbRBdvnHPnuReNb6NEQN1q";
    /// Steward (community operator) credential
    pub const STEWARD: &str = "ECJnFJL5OuQPyM5K0neuniccMBdXt3gIXOf2BBWNHdSX";
    /// Invitation credential (member invited member)
    pub const INVITATION: &str = "EDqjl80uP0r_SNSp-yImpLGglTEbOwgO77wsOPjyRVCz";
    /// Self-claim credential (subject attests about itself)
    pub const SELF_CLAIM: &str = "EFgnk_c08WmZGgv9_mpldibRuqFMTQN-rAgzxrPQOvpX";
    /// Endorsement credential
    pub const ENDORSEMENT: &str = "EGGJh4R3SRQGpryq9Nnou0d4zNbLXBSSxlyGDef5uxyh";
    /// Revocation-of-endorsement credential
    pub const REVOCATION: &str = "EHaJZN3DdQ6kmwhcqLoLWBsVAIWTTCOnVIq9rqMeMnkR";
}

/// Parsed credential schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialSchema {
    /// Org grants membership
    Membership,
    /// Org grants steward role
    Steward,
    /// Member invites member
    Invitation,
    /// Subject attests about itself
    SelfClaim,
    /// Member endorses member
    Endorsement,
    /// Revocation of an endorsement
    Revocation,
    /// Anything not in the table
    Unknown,
}

impl CredentialSchema {
    /// Parse a schema identifier — registry SAID or short name.
    pub fn from_id(schema_id: &str) -> Self {
        match schema_id {
            said::MEMBERSHIP | "membership" => Self::Membership,
            said::STEWARD | "steward" => Self::Steward,
            said::INVITATION | "invitation" => Self::Invitation,
            said::SELF_CLAIM | "self-claim" => Self::SelfClaim,
            said::ENDORSEMENT | "endorsement" => Self::Endorsement,
            said::REVOCATION | "revocation" => Self::Revocation,
            _ => Self::Unknown,
        }
    }

    /// Well-known short name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Membership => "membership",
            Self::Steward => "steward",
            Self::Invitation => "invitation",
            Self::SelfClaim => "self-claim",
            Self::Endorsement => "endorsement",
            Self::Revocation => "revocation",
            Self::Unknown => "unknown",
        }
    }
}

/// Trust-edge type derived from a credential schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeType {
    /// Org granted membership
    Membership,
    /// Org granted steward role
    Steward,
    /// Member invited member
    Invitation,
    /// Subject attested about itself (no edge is built)
    SelfClaim,
    /// Member endorsed member
    Endorsement,
    /// Endorsement was revoked
    Revocation,
    /// Unrecognised schema
    Unknown,
}

/// Space routing destination (resolved to concrete ids by `SpaceManager`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The recipient's private space
    Private,
    /// The org community space
    Community,
    /// The org read-only space
    CommunityReadonly,
}

/// One row of the dispatch table
#[derive(Debug, Clone, Copy)]
pub struct SchemaRoute {
    /// Edge type the trust graph builds for this schema
    pub edge_type: EdgeType,
    /// Destination spaces for credential routing
    pub destinations: &'static [Destination],
    /// Whether the trust graph adds an edge (self-claims do not)
    pub produces_edge: bool,
}

/// Look up the dispatch row for a schema.
///
/// Unknown schemas fall back to private-space-only routing with no edge,
/// so a schema added upstream degrades gracefully until the table learns
/// about it.
pub fn route_for(schema: CredentialSchema) -> SchemaRoute {
    use Destination::*;

    match schema {
        CredentialSchema::Membership | CredentialSchema::Steward => SchemaRoute {
            edge_type: if schema == CredentialSchema::Membership {
                EdgeType::Membership
            } else {
                EdgeType::Steward
            },
            destinations: &[Private, Community],
            produces_edge: true,
        },
        CredentialSchema::Invitation => SchemaRoute {
            edge_type: EdgeType::Invitation,
            destinations: &[Private, Community],
            produces_edge: true,
        },
        CredentialSchema::SelfClaim => SchemaRoute {
            edge_type: EdgeType::SelfClaim,
            destinations: &[Private],
            produces_edge: false,
        },
        CredentialSchema::Endorsement => SchemaRoute {
            edge_type: EdgeType::Endorsement,
            destinations: &[Private, Community],
            produces_edge: true,
        },
        CredentialSchema::Revocation => SchemaRoute {
            edge_type: EdgeType::Revocation,
            destinations: &[Private, Community, CommunityReadonly],
            produces_edge: true,
        },
        CredentialSchema::Unknown => SchemaRoute {
            edge_type: EdgeType::Unknown,
            destinations: &[Private],
            produces_edge: false,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_name_and_said() {
        assert_eq!(
            CredentialSchema::from_id("membership"),
            CredentialSchema::Membership
        );
        assert_eq!(
            CredentialSchema::from_id(said::MEMBERSHIP),
            CredentialSchema::Membership
        );
        assert_eq!(
            CredentialSchema::from_id("self-claim"),
            CredentialSchema::SelfClaim
        );
        assert_eq!(
            CredentialSchema::from_id("EUnregisteredSchemaSaid"),
            CredentialSchema::Unknown
        );
    }

    #[test]
    fn test_membership_routes_to_private_and_community() {
        let route = route_for(CredentialSchema::Membership);
        assert_eq!(
            route.destinations,
            &[Destination::Private, Destination::Community]
        );
        assert!(route.produces_edge);
        assert_eq!(route.edge_type, EdgeType::Membership);
    }

    #[test]
    fn test_self_claim_routes_private_only_no_edge() {
        let route = route_for(CredentialSchema::SelfClaim);
        assert_eq!(route.destinations, &[Destination::Private]);
        assert!(!route.produces_edge);
    }

    #[test]
    fn test_revocation_also_reaches_readonly() {
        let route = route_for(CredentialSchema::Revocation);
        assert!(route.destinations.contains(&Destination::CommunityReadonly));
        assert_eq!(route.destinations.len(), 3);
    }

    #[test]
    fn test_unknown_falls_back() {
        let route = route_for(CredentialSchema::Unknown);
        assert_eq!(route.destinations, &[Destination::Private]);
        assert!(!route.produces_edge);
        assert_eq!(route.edge_type, EdgeType::Unknown);
    }
}
