//! # Credential Tree
//!
//! Per-space append-only log of credential payloads, stored in the
//! space's CRDT tree. The payload format is an opaque JSON envelope; the
//! core neither parses it as ACDC nor verifies signatures (the KERI agent
//! did that). Convergence is by SAID equality: the same credential
//! appended twice materialises once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::credentials::Credential;
use crate::crypto::SigningKeyPair;
use crate::error::Result;

use super::SyncRuntime;

/// JSON envelope written into the space tree
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum TreeEnvelope {
    /// Root marker; exactly one per credential tree
    TreeRoot {
        /// Which tree this root anchors
        tree: String,
    },
    /// One credential record
    Credential {
        said: String,
        issuer: String,
        recipient: String,
        schema: String,
        data: serde_json::Value,
        timestamp: i64,
    },
}

const TREE_NAME: &str = "credentials";

/// Append and read credential records in space trees
#[derive(Clone)]
pub struct CredentialTree {
    runtime: Arc<dyn SyncRuntime>,
}

impl CredentialTree {
    /// Operate on trees through the given runtime
    pub fn new(runtime: Arc<dyn SyncRuntime>) -> Self {
        Self { runtime }
    }

    /// Create the credential tree rooted under a space.
    ///
    /// Idempotent: if the root already exists its change id is returned.
    pub async fn create_credential_tree(
        &self,
        space_id: &str,
        signing_key: &SigningKeyPair,
    ) -> Result<String> {
        for entry in self.runtime.tree_read(space_id).await? {
            if let Ok(TreeEnvelope::TreeRoot { tree }) = serde_json::from_slice(&entry.payload) {
                if tree == TREE_NAME {
                    return Ok(entry.change_id);
                }
            }
        }

        let root = serde_json::to_vec(&TreeEnvelope::TreeRoot {
            tree: TREE_NAME.to_string(),
        })?;
        self.runtime.tree_append(space_id, &root, signing_key).await
    }

    /// Append a credential to a space's tree.
    ///
    /// If a payload with the same SAID already exists, the existing change
    /// id is returned and nothing is appended.
    pub async fn add_credential(
        &self,
        space_id: &str,
        cred: &Credential,
        signing_key: &SigningKeyPair,
    ) -> Result<String> {
        for entry in self.runtime.tree_read(space_id).await? {
            if let Ok(TreeEnvelope::Credential { said, .. }) =
                serde_json::from_slice(&entry.payload)
            {
                if said == cred.said {
                    return Ok(entry.change_id);
                }
            }
        }

        let payload = serde_json::to_vec(&TreeEnvelope::Credential {
            said: cred.said.clone(),
            issuer: cred.issuer_id.clone(),
            recipient: cred.recipient_id.clone(),
            schema: cred.schema_id.clone(),
            data: cred.data.clone(),
            timestamp: cred.timestamp,
        })?;

        let change_id = self
            .runtime
            .tree_append(space_id, &payload, signing_key)
            .await?;
        tracing::debug!(space_id = space_id, said = cred.said.as_str(), "Credential appended");
        Ok(change_id)
    }

    /// Materialise the current tree into a deduplicated credential list.
    ///
    /// Non-credential and unparseable entries are skipped; duplicate SAIDs
    /// keep the first occurrence.
    pub async fn read_credentials(&self, space_id: &str) -> Result<Vec<Credential>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for entry in self.runtime.tree_read(space_id).await? {
            let envelope: TreeEnvelope = match serde_json::from_slice(&entry.payload) {
                Ok(env) => env,
                Err(_) => continue,
            };
            if let TreeEnvelope::Credential {
                said,
                issuer,
                recipient,
                schema,
                data,
                timestamp,
            } = envelope
            {
                if seen.insert(said.clone()) {
                    out.push(Credential {
                        said,
                        issuer_id: issuer,
                        recipient_id: recipient,
                        schema_id: schema,
                        data,
                        timestamp,
                        signature: None,
                        expires_at: None,
                    });
                }
            }
        }
        Ok(out)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeySet;
    use crate::spaces::SpaceType;
    use crate::sync::EmbeddedRuntime;

    async fn tree_with_space() -> (CredentialTree, String, SigningKeyPair) {
        let dir = tempfile::tempdir().unwrap();
        let peer = SigningKeyPair::generate();
        let mut keys = KeySet::generate();
        keys.override_signing(&peer);

        let runtime = EmbeddedRuntime::new(dir.path(), peer.duplicate()).unwrap();
        let space_id = runtime
            .create_space("EOWNER", SpaceType::Private, &keys)
            .await
            .unwrap();

        // Leak the tempdir so the space storage outlives this helper
        std::mem::forget(dir);

        (CredentialTree::new(Arc::new(runtime)), space_id, peer)
    }

    fn credential(said: &str) -> Credential {
        Credential {
            said: said.into(),
            issuer_id: "EORG123".into(),
            recipient_id: "EUSER1".into(),
            schema_id: "membership".into(),
            data: serde_json::json!({"role": "member"}),
            timestamp: 1_700_000_000,
            signature: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_tree_idempotent() {
        let (tree, space_id, signer) = tree_with_space().await;

        let root1 = tree.create_credential_tree(&space_id, &signer).await.unwrap();
        let root2 = tree.create_credential_tree(&space_id, &signer).await.unwrap();

        assert_eq!(root1, root2);
    }

    #[tokio::test]
    async fn test_add_and_read() {
        let (tree, space_id, signer) = tree_with_space().await;
        tree.create_credential_tree(&space_id, &signer).await.unwrap();

        tree.add_credential(&space_id, &credential("ESAID001"), &signer)
            .await
            .unwrap();
        tree.add_credential(&space_id, &credential("ESAID002"), &signer)
            .await
            .unwrap();

        let creds = tree.read_credentials(&space_id).await.unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].said, "ESAID001");
        assert_eq!(creds[0].schema_id, "membership");
        assert_eq!(creds[0].data_field("role"), Some("member"));
    }

    #[tokio::test]
    async fn test_add_dedups_by_said() {
        let (tree, space_id, signer) = tree_with_space().await;

        let c1 = tree
            .add_credential(&space_id, &credential("ESAID001"), &signer)
            .await
            .unwrap();

        // Same SAID with a different timestamp still dedups
        let mut again = credential("ESAID001");
        again.timestamp += 60;
        let c2 = tree.add_credential(&space_id, &again, &signer).await.unwrap();

        assert_eq!(c1, c2);
        assert_eq!(tree.read_credentials(&space_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_root_not_returned_as_credential() {
        let (tree, space_id, signer) = tree_with_space().await;
        tree.create_credential_tree(&space_id, &signer).await.unwrap();

        assert!(tree.read_credentials(&space_id).await.unwrap().is_empty());
    }
}
