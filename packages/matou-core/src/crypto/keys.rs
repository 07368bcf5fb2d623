//! # Key Types
//!
//! The peer key, the per-space key set, and the network-layer peer id.
//!
//! ## Per-Space Key Set
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  signing   Ed25519  signs the space header and ACL entries          │
//! │            (always overwritten with the user's peer key)            │
//! │  master    Ed25519  signs identity attestations inside the space    │
//! │  read      AES-256  encrypts all tree content; never exported       │
//! │  metadata  Ed25519  encrypts per-account metadata                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! For every space owned by the local user the signing key and the peer
//! key marshal to identical bytes; master and metadata keys are scoped to
//! one space.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Multicodec prefix for Ed25519 public keys (0xed01 in varint encoding)
const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

// ============================================================================
// SIGNING KEYS
// ============================================================================

/// Ed25519 signing keypair
///
/// Backs both the user's peer key and the per-space signing, master, and
/// metadata keys.
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    /// Private signing key (secret)
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut rand::rngs::OsRng);
        Self { secret }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(bytes),
        }
    }

    /// Get the secret key bytes (for backup/storage)
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message)
    }

    /// Derive the network-layer peer id from this key's public half
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_bytes())
    }

    /// Independent copy owning its own key material
    ///
    /// `Clone` is intentionally not derived because of `ZeroizeOnDrop`.
    pub fn duplicate(&self) -> Self {
        Self::from_bytes(&self.secret_bytes())
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair({})", self.peer_id())
    }
}

/// Verify an Ed25519 signature against a public key
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &Signature) -> Result<()> {
    let key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidKey(format!("Invalid public key: {}", e)))?;
    key.verify(message, signature)
        .map_err(|_| Error::InvalidKey("Signature verification failed".into()))
}

// ============================================================================
// PEER ID
// ============================================================================

/// Network-layer identity derived from an Ed25519 public key
///
/// Base58btc encoding of the multicodec-prefixed public key, with the
/// multibase `z` marker. One-to-one with a private signing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Derive a peer id from an Ed25519 public key
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut multicodec_key = Vec::with_capacity(34);
        multicodec_key.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
        multicodec_key.extend_from_slice(public_key);

        Self(format!("z{}", bs58::encode(&multicodec_key).into_string()))
    }

    /// Parse a peer id string, recovering the public key bytes
    pub fn decode(&self) -> Result<[u8; 32]> {
        let encoded = self
            .0
            .strip_prefix('z')
            .ok_or_else(|| Error::InvalidKey("Peer id must start with 'z'".into()))?;

        let decoded = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| Error::InvalidKey(format!("Invalid base58: {}", e)))?;

        if decoded.len() != 34 || decoded[..2] != ED25519_MULTICODEC_PREFIX {
            return Err(Error::InvalidKey("Peer id has wrong prefix or length".into()));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&decoded[2..]);
        Ok(key)
    }

    /// The encoded string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// READ KEY (SYMMETRIC)
// ============================================================================

/// AES-256-GCM symmetric key encrypting all tree content of one space
///
/// Read keys are generated randomly (symmetric keys have no derivation
/// path) and persisted with the rest of the key set. Never exported over
/// the wire except sealed inside an invite record.
#[derive(ZeroizeOnDrop)]
pub struct ReadKey {
    bytes: [u8; 32],
}

impl ReadKey {
    /// Generate a new random read key
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Raw key bytes, for persistence only
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    /// Encrypt a payload; output is `nonce || ciphertext+tag`.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.bytes)
            .map_err(|_| Error::InvalidKey("Read key has wrong length".into()))?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(
                AesNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| Error::EncryptionFailed("AES-GCM encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a `nonce || ciphertext+tag` payload.
    pub fn decrypt(&self, data: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_SIZE {
            return Err(Error::DecryptionFailed("Ciphertext too short".into()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.bytes)
            .map_err(|_| Error::InvalidKey("Read key has wrong length".into()))?;

        cipher
            .decrypt(
                AesNonce::from_slice(&data[..NONCE_SIZE]),
                Payload {
                    msg: &data[NONCE_SIZE..],
                    aad,
                },
            )
            .map_err(|_| Error::DecryptionFailed("AES-GCM decryption failed".into()))
    }

    /// Independent copy owning its own key material
    pub fn duplicate(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl std::fmt::Debug for ReadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReadKey([REDACTED])")
    }
}

// ============================================================================
// KEY SET
// ============================================================================

/// The four keys scoping one space
pub struct KeySet {
    /// Signs the space header and ACL entries; equals the owner's peer key
    pub signing: SigningKeyPair,
    /// Signs identity attestations inside the space
    pub master: SigningKeyPair,
    /// Symmetric key over all tree content
    pub read: ReadKey,
    /// Encrypts per-account metadata
    pub metadata: SigningKeyPair,
}

impl KeySet {
    /// Generate a key set with all four keys random
    pub fn generate() -> Self {
        Self {
            signing: SigningKeyPair::generate(),
            master: SigningKeyPair::generate(),
            read: ReadKey::generate(),
            metadata: SigningKeyPair::generate(),
        }
    }

    /// Replace the signing key with the user's peer key.
    ///
    /// Applied on every space create and recovery so the space signing key
    /// and the peer key marshal to identical bytes.
    pub fn override_signing(&mut self, peer_key: &SigningKeyPair) {
        self.signing = peer_key.duplicate();
    }

    /// Independent copy owning its own key material
    pub fn duplicate(&self) -> Self {
        Self {
            signing: self.signing.duplicate(),
            master: self.master.duplicate(),
            read: self.read.duplicate(),
            metadata: self.metadata.duplicate(),
        }
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeySet(signing={})", self.signing.peer_id())
    }
}

// ============================================================================
// TESTS
// ============================================================================
