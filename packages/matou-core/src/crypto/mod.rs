//! # Cryptography
//!
//! Key types and derivation for the coordination core.
//!
//! - [`keys`] - Ed25519 signing keys, the symmetric read key, and the
//!   four-key per-space [`KeySet`](keys::KeySet)
//! - [`kdf`] - HKDF index derivation over the BIP-39 master seed

pub mod kdf;
pub mod keys;

pub use keys::{verify, KeySet, PeerId, ReadKey, SigningKeyPair};
