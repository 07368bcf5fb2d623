//! # MATOU Core
//!
//! Per-user coordination core for a KERI-credentialed peer-to-peer
//! collaboration system. It sits between a client that holds the KERI
//! identity (and signs everything) and a decentralised sync network of
//! CRDT-replicated spaces.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          MATOU CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Identity   │  │    Vault    │  │   Spaces    │  │ Credentials  │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Mnemonic  │  │ - Peer key  │  │ - Manager   │  │ - Cache      │   │
//! │  │ - AID       │  │ - Key sets  │  │ - ACLs      │  │ - Schemas    │   │
//! │  │ - Store     │  │ - 0600 disk │  │ - Routing   │  │ - Endorse    │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴───────┬────────┴────────────────┘           │
//! │                                  │                                     │
//! │  ┌─────────────┐  ┌─────────────┐│┌─────────────┐  ┌──────────────┐   │
//! │  │    Trust    │  │    Swap     │││    Sync     │  │    Events    │   │
//! │  │             │  │             │││             │  │              │   │
//! │  │ - Graph     │  │ - Re-key    │◄┘ - Runtime   │  │ - Fan-out    │   │
//! │  │ - Scores    │  │ - Recovery  │   - Trees     │  │ - Drop slow  │   │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └──────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types and the HTTP-facing kind taxonomy
//! - [`crypto`] - Keys, key sets, and seed-index derivation
//! - [`identity`] - Mnemonic handling and the identity store
//! - [`vault`] - Key persistence (peer key + per-space key sets)
//! - [`storage`] - Embedded cache database
//! - [`credentials`] - Credential model and schema dispatch
//! - [`spaces`] - Space model, ACL policies, store, and orchestration
//! - [`sync`] - Sync runtime seam and credential trees
//! - [`trust`] - Derived trust graph and scoring
//! - [`swap`] - Identity re-keying state machine
//! - [`events`] - In-process event fan-out
//!
//! There is no process-global state: a service value owns the stores,
//! the runtime, and the event bus, and handlers close over it.

#![warn(missing_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod credentials;
pub mod crypto;
pub mod error;
pub mod events;
pub mod identity;
pub mod spaces;
pub mod storage;
pub mod swap;
pub mod sync;
/// Time utilities shared by every module that stamps records.
pub mod time;
pub mod trust;
pub mod vault;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use credentials::{Credential, CredentialSchema, Endorsement};
pub use crypto::{KeySet, PeerId, SigningKeyPair};
pub use error::{Error, ErrorKind, Result};
pub use identity::{IdentityRecord, IdentityStore, RecoveryPhrase};
pub use spaces::{SpaceManager, SpaceStore, SpaceType};
pub use storage::Database;
pub use swap::{IdentitySwapper, SwapRequest, SwapResult};
pub use sync::{EmbeddedRuntime, SyncRuntime};
pub use trust::{ScoreWeights, TrustGraph, TrustService};
pub use vault::KeyVault;

/// Returns the version of the core crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
