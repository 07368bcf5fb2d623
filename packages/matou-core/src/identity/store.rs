//! # Identity Store
//!
//! Durable storage for the single local identity record. One JSON file,
//! one mutex: writers serialise, readers take the same lock briefly, and
//! every mutation is fsynced before the call returns.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::time::now_timestamp;

/// File name of the persisted identity record.
const IDENTITY_FILE: &str = "identity.json";

/// The persisted local identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityRecord {
    /// KERI identifier of the local user
    pub aid: String,
    /// BIP39 recovery phrase the key hierarchy derives from
    pub mnemonic: String,
    /// Peer id derived from the mnemonic at index 0
    pub peer_id: String,
    /// Organisation identifier, if the user has joined one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_aid: Option<String>,
    /// The user's private space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_space_id: Option<String>,
    /// Org-owned community space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_space_id: Option<String>,
    /// Org-owned read-only space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly_space_id: Option<String>,
    /// Org-owned admin space (admins only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_space_id: Option<String>,
    /// SAID of the membership credential presented at registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_said: Option<String>,
    /// When this record was first written (Unix seconds)
    pub created_at: i64,
    /// When this record was last written (Unix seconds)
    pub updated_at: i64,
}

/// Durable store for the process-local identity
pub struct IdentityStore {
    path: PathBuf,
    /// In-memory copy guarded by the same lock that serialises writers
    current: Mutex<Option<IdentityRecord>>,
}

impl IdentityStore {
    /// Open the store, loading any existing record from disk.
    ///
    /// A corrupt identity file is a fatal init error: the service refuses
    /// to guess at which identity it is running as.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(IDENTITY_FILE);

        let current = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| Error::StorageRead(format!("{}: {}", path.display(), e)))?;
            let record: IdentityRecord = serde_json::from_str(&raw)
                .map_err(|e| Error::Corrupted(format!("{}: {}", path.display(), e)))?;
            Some(record)
        } else {
            None
        };

        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    /// Whether an identity has been set
    pub fn is_configured(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Get a copy of the current record
    pub fn get(&self) -> Option<IdentityRecord> {
        self.current.lock().clone()
    }

    /// Get the current record, erroring if none is configured
    pub fn require(&self) -> Result<IdentityRecord> {
        self.get().ok_or(Error::IdentityNotConfigured)
    }

    /// Replace the identity record, persisting before returning.
    pub fn set(&self, mut record: IdentityRecord) -> Result<()> {
        let mut guard = self.current.lock();

        record.created_at = guard
            .as_ref()
            .filter(|existing| existing.aid == record.aid)
            .map(|existing| existing.created_at)
            .unwrap_or(record.created_at);
        record.updated_at = now_timestamp();

        self.write_file(&record)?;
        *guard = Some(record);
        Ok(())
    }

    /// Mutate the current record in place, persisting before returning.
    pub fn update<F>(&self, mutate: F) -> Result<IdentityRecord>
    where
        F: FnOnce(&mut IdentityRecord),
    {
        let mut guard = self.current.lock();
        let mut record = guard.clone().ok_or(Error::IdentityNotConfigured)?;

        mutate(&mut record);
        record.updated_at = now_timestamp();

        self.write_file(&record)?;
        *guard = Some(record.clone());
        Ok(record)
    }

    /// Clear the identity: the file is deleted and the memory copy dropped.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.current.lock();

        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| Error::StorageWrite(format!("{}: {}", self.path.display(), e)))?;
        }
        *guard = None;
        Ok(())
    }

    /// Write the record to a temp file, fsync, then rename into place.
    fn write_file(&self, record: &IdentityRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .map_err(|e| Error::StorageWrite(format!("{}: {}", tmp.display(), e)))?;
            file.write_all(json.as_bytes())
                .map_err(|e| Error::StorageWrite(format!("{}: {}", tmp.display(), e)))?;
            file.sync_all()
                .map_err(|e| Error::StorageWrite(format!("{}: {}", tmp.display(), e)))?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::StorageWrite(format!("{}: {}", tmp.display(), e)))?;
        }

        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::StorageWrite(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> IdentityRecord {
        IdentityRecord {
            aid: "EAID".into(),
            mnemonic: "abandon ... about".into(),
            peer_id: "zPeer".into(),
            org_aid: None,
            private_space_id: None,
            community_space_id: None,
            readonly_space_id: None,
            admin_space_id: None,
            credential_said: None,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    #[test]
    fn test_empty_on_first_boot() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::open(dir.path()).unwrap();

        assert!(!store.is_configured());
        assert!(store.get().is_none());
        assert!(store.require().is_err());
    }

    #[test]
    fn test_set_then_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let store = IdentityStore::open(dir.path()).unwrap();
        store.set(sample_record()).unwrap();

        let reopened = IdentityStore::open(dir.path()).unwrap();
        assert_eq!(reopened.require().unwrap().aid, "EAID");
    }

    #[test]
    fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::open(dir.path()).unwrap();
        store.set(sample_record()).unwrap();

        store
            .update(|rec| rec.private_space_id = Some("ESPACE".into()))
            .unwrap();

        let reopened = IdentityStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.require().unwrap().private_space_id.as_deref(),
            Some("ESPACE")
        );
    }

    #[test]
    fn test_clear_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::open(dir.path()).unwrap();
        store.set(sample_record()).unwrap();

        store.clear().unwrap();

        assert!(!store.is_configured());
        assert!(!dir.path().join(IDENTITY_FILE).exists());
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(IDENTITY_FILE), "not json").unwrap();

        assert!(IdentityStore::open(dir.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::open(dir.path()).unwrap();
        store.set(sample_record()).unwrap();

        let mode = fs::metadata(dir.path().join(IDENTITY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
