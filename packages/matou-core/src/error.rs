//! # Error Handling
//!
//! Error types for the MATOU coordination core.
//!
//! Every error maps to exactly one [`ErrorKind`]; the HTTP boundary
//! translates kinds to status codes in a single place. Inside the core,
//! errors propagate as `Result<T>` with `?` — no handler translates more
//! than one layer.
//!
//! ## Error Taxonomy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ Kind                │ Recovery        │ Examples                    │
//! ├─────────────────────┼─────────────────┼─────────────────────────────┤
//! │ InvalidInput        │ none            │ bad mnemonic, bad schema    │
//! │ NotConfigured       │ none            │ identity not set, no org    │
//! │ NotFound            │ none            │ space, credential missing   │
//! │ Conflict            │ none            │ space exists, other owner   │
//! │ RuntimeUnavailable  │ retry later     │ runtime closed, coordinator │
//! │ UpstreamFailure     │ partial         │ tree append failed          │
//! │ Busy                │ retry later     │ identity swap in flight     │
//! │ Internal            │ none            │ unexpected condition        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification used by the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request is malformed; retrying the same input cannot succeed.
    InvalidInput,
    /// A prerequisite (identity, org config) has not been set up.
    NotConfigured,
    /// The referenced entity does not exist.
    NotFound,
    /// The operation conflicts with existing state.
    Conflict,
    /// The sync runtime is absent or the coordinator is down; retry later.
    RuntimeUnavailable,
    /// An upstream call failed after local state was (partially) written.
    UpstreamFailure,
    /// An exclusive operation is already in flight; retry later.
    Busy,
    /// Unexpected internal condition.
    Internal,
}

/// Main error type for the coordination core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity
    // ========================================================================

    /// No identity has been configured yet
    #[error("No identity configured. Set an identity first.")]
    IdentityNotConfigured,

    /// Invalid recovery mnemonic
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// Malformed identifier (AID/SAID)
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// An identity swap is already running
    #[error("Identity swap already in progress.")]
    SwapInProgress,

    // ========================================================================
    // Org
    // ========================================================================

    /// Organisation configuration missing
    #[error("Organisation is not configured.")]
    OrgNotConfigured,

    // ========================================================================
    // Spaces & Sync Runtime
    // ========================================================================

    /// Space is not known to this node or the coordinator
    #[error("Space not found: {0}")]
    SpaceNotFound(String),

    /// Space already registered with the coordinator
    #[error("Space already exists: {0}")]
    SpaceExists(String),

    /// Space exists but is owned by a different identifier
    #[error("Space {space_id} is owned by {owner}")]
    SpaceConflict {
        /// The contested space
        space_id: String,
        /// Its registered owner
        owner: String,
    },

    /// Coordinator could not be reached
    #[error("Coordinator unreachable: {0}")]
    CoordinatorUnreachable(String),

    /// No sync runtime is bound (e.g. after a failed identity swap)
    #[error("Sync runtime unavailable.")]
    RuntimeUnavailable,

    /// Space has not been marked shareable
    #[error("Space {0} is not shareable")]
    NotShareable(String),

    /// Caller does not own the space
    #[error("Not the owner of space {0}")]
    NotOwner(String),

    /// Invite key failed to validate against the space's invite records
    #[error("Invalid invite: {0}")]
    InvalidInvite(String),

    /// Peer already appears on the space ACL
    #[error("Already a member of space {0}")]
    AlreadyMember(String),

    /// Space handle is closed; tree operations are rejected
    #[error("Space {0} is closed")]
    SpaceClosed(String),

    /// Tree append failed on the runtime
    #[error("Tree append failed: {0}")]
    TreeAppendFailed(String),

    /// Access policy denied the operation
    #[error("Access denied: {0}")]
    AccessDenied(String),

    // ========================================================================
    // Credentials
    // ========================================================================

    /// Credential not present in the cache
    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    /// Structurally invalid credential
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Endorsement not present in the cache
    #[error("Endorsement not found: {0}")]
    EndorsementNotFound(String),

    // ========================================================================
    // Crypto
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // ========================================================================
    // Storage
    // ========================================================================

    /// Failed to read from disk
    #[error("Failed to read from storage: {0}")]
    StorageRead(String),

    /// Failed to write to disk
    #[error("Failed to write to storage: {0}")]
    StorageWrite(String),

    /// Embedded database error
    #[error("Database error: {0}")]
    Database(String),

    /// On-disk data failed to parse
    #[error("Data corruption detected: {0}")]
    Corrupted(String),

    // ========================================================================
    // Internal
    // ========================================================================

    /// Operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error for the HTTP boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidMnemonic(_)
            | Error::InvalidIdentifier(_)
            | Error::InvalidCredential(_)
            | Error::InvalidInvite(_)
            | Error::InvalidKey(_) => ErrorKind::InvalidInput,

            Error::IdentityNotConfigured | Error::OrgNotConfigured => ErrorKind::NotConfigured,

            Error::SpaceNotFound(_)
            | Error::CredentialNotFound(_)
            | Error::EndorsementNotFound(_) => ErrorKind::NotFound,

            Error::SpaceExists(_)
            | Error::SpaceConflict { .. }
            | Error::AlreadyMember(_)
            | Error::NotShareable(_)
            | Error::NotOwner(_)
            | Error::AccessDenied(_) => ErrorKind::Conflict,

            Error::RuntimeUnavailable | Error::CoordinatorUnreachable(_) => {
                ErrorKind::RuntimeUnavailable
            }

            Error::TreeAppendFailed(_) | Error::SpaceClosed(_) => ErrorKind::UpstreamFailure,

            Error::SwapInProgress => ErrorKind::Busy,

            Error::KeyDerivationFailed(_)
            | Error::EncryptionFailed(_)
            | Error::DecryptionFailed(_)
            | Error::StorageRead(_)
            | Error::StorageWrite(_)
            | Error::Database(_)
            | Error::Corrupted(_)
            | Error::Timeout(_)
            | Error::Serialization(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check whether retrying later may succeed without input changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RuntimeUnavailable | ErrorKind::Busy
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageRead(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            Error::InvalidMnemonic("bad".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(Error::IdentityNotConfigured.kind(), ErrorKind::NotConfigured);
        assert_eq!(
            Error::SpaceNotFound("EABC".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(Error::RuntimeUnavailable.kind(), ErrorKind::RuntimeUnavailable);
        assert_eq!(Error::SwapInProgress.kind(), ErrorKind::Busy);
        assert_eq!(
            Error::TreeAppendFailed("closed".into()).kind(),
            ErrorKind::UpstreamFailure
        );
    }

    #[test]
    fn test_retryable() {
        assert!(Error::RuntimeUnavailable.is_retryable());
        assert!(Error::SwapInProgress.is_retryable());
        assert!(Error::CoordinatorUnreachable("down".into()).is_retryable());
        assert!(!Error::InvalidMnemonic("x".into()).is_retryable());
        assert!(!Error::Internal("x".into()).is_retryable());
    }

    #[test]
    fn test_conflict_message() {
        let err = Error::SpaceConflict {
            space_id: "ESPACE".into(),
            owner: "EOWNER".into(),
        };
        assert!(err.to_string().contains("ESPACE"));
        assert!(err.to_string().contains("EOWNER"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
