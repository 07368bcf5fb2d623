//! # Credentials
//!
//! Verifiable credential records as this service sees them: a small typed
//! header (`said` / `issuer` / `recipient` / `schema`) around an opaque
//! data map. The KERI agent verified signatures before we ever see a
//! credential; the core only checks structure, routes, caches, and builds
//! the trust graph from the headers.

pub mod schema;

pub use schema::{route_for, CredentialSchema, Destination, EdgeType, SchemaRoute};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::validate_identifier;

/// A cached verifiable credential
///
/// `data` is passed through untouched; the trust graph reads only a few
/// well-known fields (`role`, `displayName`, `joinedAt`) out of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    /// Self-addressing identifier of the credential document
    pub said: String,
    /// Issuer identifier
    pub issuer_id: String,
    /// Recipient (subject) identifier
    pub recipient_id: String,
    /// Schema identifier (SAID or well-known name)
    pub schema_id: String,
    /// Opaque credential body
    #[serde(default)]
    pub data: serde_json::Value,
    /// Issuance timestamp (Unix seconds)
    pub timestamp: i64,
    /// Optional detached signature, carried through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Optional expiry (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Credential {
    /// The parsed schema of this credential
    pub fn schema(&self) -> CredentialSchema {
        CredentialSchema::from_id(&self.schema_id)
    }

    /// Structural validation of the typed header.
    ///
    /// Checks identifier shapes and field presence only. No cryptographic
    /// verification happens here — the KERI agent did that.
    pub fn validate_structure(&self) -> Result<()> {
        validate_identifier(&self.said)
            .map_err(|_| Error::InvalidCredential(format!("Bad SAID '{}'", self.said)))?;
        validate_identifier(&self.issuer_id)
            .map_err(|_| Error::InvalidCredential(format!("Bad issuer '{}'", self.issuer_id)))?;
        validate_identifier(&self.recipient_id)
            .map_err(|_| Error::InvalidCredential(format!("Bad recipient '{}'", self.recipient_id)))?;
        if self.schema_id.is_empty() {
            return Err(Error::InvalidCredential("Missing schema".into()));
        }
        Ok(())
    }

    /// Read a well-known string field out of the opaque data map.
    pub fn data_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|v| v.as_str())
    }
}

/// An endorsement: a credential under the endorsement schema with its
/// claim fields lifted out, plus revocation bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Endorsement {
    /// SAID of the endorsement credential
    pub said: String,
    /// Who endorses
    pub endorser_id: String,
    /// Who is endorsed
    pub endorsee_id: String,
    /// The endorsed claim text
    pub claim: String,
    /// Endorser confidence in [0, 1]
    pub confidence: f64,
    /// Issuance timestamp (Unix seconds)
    pub timestamp: i64,
    /// Whether a revocation credential has been recorded for this one
    #[serde(default)]
    pub revoked: bool,
    /// When the revocation was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<i64>,
    /// SAID of the revocation credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_said: Option<String>,
    /// Free-form revocation reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
