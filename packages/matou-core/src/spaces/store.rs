//! Durable space index over the embedded database.
//!
//! Thin by design: the database enforces idempotent inserts and the
//! owner-conflict rule; this wrapper owns the keys-path convention.

use crate::error::Result;
use crate::storage::{Database, SpaceRecord};
use crate::time::now_timestamp;

use super::SpaceType;

/// Durable mapping `space_id → {owner, type, keys-on-disk, created_at}`
#[derive(Clone)]
pub struct SpaceStore {
    db: Database,
}

impl SpaceStore {
    /// Wrap the shared database handle
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a space, idempotently.
    ///
    /// Returns `true` if the record is new. Re-recording the same space
    /// for the same owner is a no-op; a different owner is a conflict.
    pub fn record(&self, space_id: &str, owner_id: &str, space_type: SpaceType) -> Result<bool> {
        self.db.insert_space(&SpaceRecord {
            space_id: space_id.to_string(),
            owner_id: owner_id.to_string(),
            space_type,
            keys_path: format!("keys/{}.keys", space_id),
            created_at: now_timestamp(),
        })
    }

    /// Look up a space by id
    pub fn get(&self, space_id: &str) -> Result<Option<SpaceRecord>> {
        self.db.get_space(space_id)
    }

    /// The owner's private space record
    pub fn get_user_space(&self, owner_id: &str) -> Result<Option<SpaceRecord>> {
        self.db.get_user_space(owner_id)
    }

    /// All recorded spaces
    pub fn all(&self) -> Result<Vec<SpaceRecord>> {
        self.db.get_all_spaces()
    }

    /// Forget a space (identity swap abandons the old private space)
    pub fn remove(&self, space_id: &str) -> Result<bool> {
        self.db.remove_space(space_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let store = SpaceStore::new(Database::open(None).unwrap());

        assert!(store.record("ESPACE", "EUSER", SpaceType::Private).unwrap());
        assert!(!store.record("ESPACE", "EUSER", SpaceType::Private).unwrap());

        let rec = store.get("ESPACE").unwrap().unwrap();
        assert_eq!(rec.keys_path, "keys/ESPACE.keys");
        assert_eq!(
            store.get_user_space("EUSER").unwrap().unwrap().space_id,
            "ESPACE"
        );
    }

    #[test]
    fn test_remove() {
        let store = SpaceStore::new(Database::open(None).unwrap());
        store.record("ESPACE", "EUSER", SpaceType::Private).unwrap();

        assert!(store.remove("ESPACE").unwrap());
        assert!(store.get("ESPACE").unwrap().is_none());
        assert!(!store.remove("ESPACE").unwrap());
    }
}
