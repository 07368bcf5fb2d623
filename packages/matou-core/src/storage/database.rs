//! SQLite wrapper for the embedded cache database.
//!
//! High-level methods per table; the connection serialises on one mutex
//! (writers are short, readers copy rows out under the lock).

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::schema;
use crate::credentials::{Credential, Endorsement};
use crate::error::{Error, Result};
use crate::spaces::SpaceType;
use crate::time::now_timestamp;

/// The main database handle
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database.
    ///
    /// If `path` is `None`, creates an in-memory database (tests).
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory()
                .map_err(|e| Error::Database(format!("Failed to create in-memory database: {}", e)))?,
        };

        conn.execute_batch(schema::CREATE_TABLES)
            .map_err(|e| Error::Database(format!("Failed to create tables: {}", e)))?;

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(|e| Error::Database(format!("Failed to set schema version: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ========================================================================
    // SPACES
    // ========================================================================

    /// Insert a space record, idempotently.
    ///
    /// Returns `true` if the row is new. Re-inserting the same space for
    /// the same owner is a no-op (recovery path); the same id under a
    /// different owner is a conflict.
    pub fn insert_space(&self, record: &SpaceRecord) -> Result<bool> {
        let conn = self.conn.lock();

        let existing: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM spaces WHERE space_id = ?",
                params![record.space_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to check space: {}", e)))?;

        if let Some(owner) = existing {
            if owner != record.owner_id {
                return Err(Error::SpaceConflict {
                    space_id: record.space_id.clone(),
                    owner,
                });
            }
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO spaces (space_id, owner_id, space_type, keys_path, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.space_id,
                record.owner_id,
                record.space_type.as_str(),
                record.keys_path,
                record.created_at,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to insert space: {}", e)))?;

        Ok(true)
    }

    /// Get a space by id
    pub fn get_space(&self, space_id: &str) -> Result<Option<SpaceRecord>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT space_id, owner_id, space_type, keys_path, created_at
             FROM spaces WHERE space_id = ?",
            params![space_id],
            row_to_space,
        )
        .optional()
        .map_err(|e| Error::Database(format!("Failed to get space: {}", e)))
    }

    /// Get the owner's private space record
    pub fn get_user_space(&self, owner_id: &str) -> Result<Option<SpaceRecord>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT space_id, owner_id, space_type, keys_path, created_at
             FROM spaces WHERE owner_id = ? AND space_type = ?",
            params![owner_id, SpaceType::Private.as_str()],
            row_to_space,
        )
        .optional()
        .map_err(|e| Error::Database(format!("Failed to get user space: {}", e)))
    }

    /// All space records, oldest first
    pub fn get_all_spaces(&self) -> Result<Vec<SpaceRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT space_id, owner_id, space_type, keys_path, created_at
                 FROM spaces ORDER BY created_at",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_space)
            .map_err(|e| Error::Database(format!("Failed to query spaces: {}", e)))?;

        collect_rows(rows)
    }

    /// Delete a space row (used when an identity swap abandons old spaces)
    pub fn remove_space(&self, space_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn
            .execute("DELETE FROM spaces WHERE space_id = ?", params![space_id])
            .map_err(|e| Error::Database(format!("Failed to remove space: {}", e)))?;
        Ok(n > 0)
    }

    // ========================================================================
    // CREDENTIALS
    // ========================================================================

    /// Insert a credential into the cache, deduplicating by SAID.
    ///
    /// Returns `true` if the credential is new.
    pub fn insert_credential(&self, cred: &Credential) -> Result<bool> {
        let conn = self.conn.lock();

        let n = conn
            .execute(
                "INSERT OR IGNORE INTO credentials
                 (said, issuer_id, recipient_id, schema_id, data, timestamp, signature, expires_at, received_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    cred.said,
                    cred.issuer_id,
                    cred.recipient_id,
                    cred.schema_id,
                    serde_json::to_string(&cred.data)?,
                    cred.timestamp,
                    cred.signature,
                    cred.expires_at,
                    now_timestamp(),
                ],
            )
            .map_err(|e| Error::Database(format!("Failed to insert credential: {}", e)))?;

        Ok(n > 0)
    }

    /// Get a credential by SAID
    pub fn get_credential(&self, said: &str) -> Result<Option<Credential>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT said, issuer_id, recipient_id, schema_id, data, timestamp, signature, expires_at
             FROM credentials WHERE said = ?",
            params![said],
            row_to_credential,
        )
        .optional()
        .map_err(|e| Error::Database(format!("Failed to get credential: {}", e)))
    }

    /// All cached credentials, oldest first
    pub fn get_all_credentials(&self) -> Result<Vec<Credential>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT said, issuer_id, recipient_id, schema_id, data, timestamp, signature, expires_at
                 FROM credentials ORDER BY timestamp, said",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_credential)
            .map_err(|e| Error::Database(format!("Failed to query credentials: {}", e)))?;

        collect_rows(rows)
    }

    /// Credentials held by a recipient, oldest first
    pub fn get_credentials_for(&self, recipient_id: &str) -> Result<Vec<Credential>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT said, issuer_id, recipient_id, schema_id, data, timestamp, signature, expires_at
                 FROM credentials WHERE recipient_id = ? ORDER BY timestamp, said",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![recipient_id], row_to_credential)
            .map_err(|e| Error::Database(format!("Failed to query credentials: {}", e)))?;

        collect_rows(rows)
    }

    // ========================================================================
    // ENDORSEMENTS
    // ========================================================================

    /// Insert or refresh an endorsement record.
    pub fn upsert_endorsement(&self, e: &Endorsement) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO endorsements
             (said, endorser_id, endorsee_id, claim, confidence, timestamp,
              revoked, revoked_at, revocation_said, revocation_reason)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(said) DO UPDATE SET
              claim = excluded.claim,
              confidence = excluded.confidence",
            params![
                e.said,
                e.endorser_id,
                e.endorsee_id,
                e.claim,
                e.confidence,
                e.timestamp,
                e.revoked as i64,
                e.revoked_at,
                e.revocation_said,
                e.revocation_reason,
            ],
        )
        .map_err(|err| Error::Database(format!("Failed to upsert endorsement: {}", err)))?;

        Ok(())
    }

    /// Get an endorsement by SAID
    pub fn get_endorsement(&self, said: &str) -> Result<Option<Endorsement>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT said, endorser_id, endorsee_id, claim, confidence, timestamp,
                    revoked, revoked_at, revocation_said, revocation_reason
             FROM endorsements WHERE said = ?",
            params![said],
            row_to_endorsement,
        )
        .optional()
        .map_err(|e| Error::Database(format!("Failed to get endorsement: {}", e)))
    }

    /// Record a revocation against an endorsement.
    ///
    /// Returns `false` if the endorsement is unknown.
    pub fn mark_endorsement_revoked(
        &self,
        said: &str,
        revocation_said: &str,
        reason: Option<&str>,
        revoked_at: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock();

        let n = conn
            .execute(
                "UPDATE endorsements
                 SET revoked = 1, revoked_at = ?, revocation_said = ?, revocation_reason = ?
                 WHERE said = ?",
                params![revoked_at, revocation_said, reason, said],
            )
            .map_err(|e| Error::Database(format!("Failed to revoke endorsement: {}", e)))?;

        Ok(n > 0)
    }

    /// Endorsements received by an identifier, oldest first
    pub fn endorsements_for(&self, endorsee_id: &str) -> Result<Vec<Endorsement>> {
        self.endorsements_by_column("endorsee_id", endorsee_id)
    }

    /// Endorsements issued by an identifier, oldest first
    pub fn endorsements_issued_by(&self, endorser_id: &str) -> Result<Vec<Endorsement>> {
        self.endorsements_by_column("endorser_id", endorser_id)
    }

    fn endorsements_by_column(&self, column: &str, value: &str) -> Result<Vec<Endorsement>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT said, endorser_id, endorsee_id, claim, confidence, timestamp,
                    revoked, revoked_at, revocation_said, revocation_reason
             FROM endorsements WHERE {} = ? ORDER BY timestamp, said",
            column
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![value], row_to_endorsement)
            .map_err(|e| Error::Database(format!("Failed to query endorsements: {}", e)))?;

        collect_rows(rows)
    }

    // ========================================================================
    // KEY EVENT LOG
    // ========================================================================

    /// Store a key event, idempotently per `(aid, sequence)`.
    ///
    /// Returns `true` if the event is new.
    pub fn insert_kel_event(&self, aid: &str, sequence: i64, event: &str) -> Result<bool> {
        let conn = self.conn.lock();

        let n = conn
            .execute(
                "INSERT OR IGNORE INTO kel_events (aid, sequence, event, received_at)
                 VALUES (?, ?, ?, ?)",
                params![aid, sequence, event, now_timestamp()],
            )
            .map_err(|e| Error::Database(format!("Failed to insert key event: {}", e)))?;

        Ok(n > 0)
    }

    /// The stored key event log for an identifier, in sequence order
    pub fn kel_for(&self, aid: &str) -> Result<Vec<KelEventRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT aid, sequence, event, received_at
                 FROM kel_events WHERE aid = ? ORDER BY sequence",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![aid], |row| {
                Ok(KelEventRecord {
                    aid: row.get(0)?,
                    sequence: row.get(1)?,
                    event: row.get(2)?,
                    received_at: row.get(3)?,
                })
            })
            .map_err(|e| Error::Database(format!("Failed to query key events: {}", e)))?;

        collect_rows(rows)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn row_to_space(row: &rusqlite::Row<'_>) -> rusqlite::Result<SpaceRecord> {
    let type_str: String = row.get(2)?;
    Ok(SpaceRecord {
        space_id: row.get(0)?,
        owner_id: row.get(1)?,
        space_type: SpaceType::parse(&type_str).unwrap_or(SpaceType::Private),
        keys_path: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_credential(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
    let data_json: String = row.get(4)?;
    Ok(Credential {
        said: row.get(0)?,
        issuer_id: row.get(1)?,
        recipient_id: row.get(2)?,
        schema_id: row.get(3)?,
        data: serde_json::from_str(&data_json).unwrap_or(serde_json::Value::Null),
        timestamp: row.get(5)?,
        signature: row.get(6)?,
        expires_at: row.get(7)?,
    })
}

fn row_to_endorsement(row: &rusqlite::Row<'_>) -> rusqlite::Result<Endorsement> {
    let revoked: i64 = row.get(6)?;
    Ok(Endorsement {
        said: row.get(0)?,
        endorser_id: row.get(1)?,
        endorsee_id: row.get(2)?,
        claim: row.get(3)?,
        confidence: row.get(4)?,
        timestamp: row.get(5)?,
        revoked: revoked != 0,
        revoked_at: row.get(7)?,
        revocation_said: row.get(8)?,
        revocation_reason: row.get(9)?,
    })
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| Error::Database(format!("Failed to read row: {}", e)))?);
    }
    Ok(out)
}

// ============================================================================
// RECORDS
// ============================================================================

/// A space this node owns keys for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRecord {
    /// Deterministic space identifier
    pub space_id: String,
    /// Owning identifier (user AID or org AID)
    pub owner_id: String,
    /// Space flavour
    pub space_type: SpaceType,
    /// Path of the key bundle relative to the data dir
    pub keys_path: String,
    /// When this row was first written (Unix seconds)
    pub created_at: i64,
}

/// A cached key event
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KelEventRecord {
    /// Identifier the event belongs to
    pub aid: String,
    /// Position in the log
    pub sequence: i64,
    /// Raw event JSON, stored verbatim
    pub event: String,
    /// When this node stored the event (Unix seconds)
    pub received_at: i64,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open(None).unwrap()
    }

    fn space(space_id: &str, owner: &str, space_type: SpaceType) -> SpaceRecord {
        SpaceRecord {
            space_id: space_id.into(),
            owner_id: owner.into(),
            space_type,
            keys_path: format!("keys/{}.keys", space_id),
            created_at: now_timestamp(),
        }
    }

    fn credential(said: &str) -> Credential {
        Credential {
            said: said.into(),
            issuer_id: "EORG".into(),
            recipient_id: "EUSER".into(),
            schema_id: "membership".into(),
            data: serde_json::json!({"role": "member"}),
            timestamp: 1_700_000_000,
            signature: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_space_insert_idempotent() {
        let db = db();
        let rec = space("ESPACE", "EOWNER", SpaceType::Private);

        assert!(db.insert_space(&rec).unwrap());
        // Same id, same owner: no-op
        assert!(!db.insert_space(&rec).unwrap());
        assert_eq!(db.get_all_spaces().unwrap().len(), 1);
    }

    #[test]
    fn test_space_other_owner_conflicts() {
        let db = db();
        db.insert_space(&space("ESPACE", "EOWNER", SpaceType::Private))
            .unwrap();

        let err = db
            .insert_space(&space("ESPACE", "EOTHER", SpaceType::Private))
            .unwrap_err();
        assert!(matches!(err, Error::SpaceConflict { .. }));
    }

    #[test]
    fn test_get_user_space() {
        let db = db();
        db.insert_space(&space("EPRIV", "EUSER", SpaceType::Private))
            .unwrap();
        db.insert_space(&space("ECOMM", "EORG", SpaceType::Community))
            .unwrap();

        let rec = db.get_user_space("EUSER").unwrap().unwrap();
        assert_eq!(rec.space_id, "EPRIV");
        assert!(db.get_user_space("ENOBODY").unwrap().is_none());
    }

    #[test]
    fn test_credential_dedup_by_said() {
        let db = db();

        assert!(db.insert_credential(&credential("ESAID001")).unwrap());
        assert!(!db.insert_credential(&credential("ESAID001")).unwrap());

        let all = db.get_all_credentials().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data_field("role"), Some("member"));
    }

    #[test]
    fn test_credentials_for_recipient() {
        let db = db();
        db.insert_credential(&credential("ESAID001")).unwrap();

        let mut other = credential("ESAID002");
        other.recipient_id = "EOTHER".into();
        db.insert_credential(&other).unwrap();

        assert_eq!(db.get_credentials_for("EUSER").unwrap().len(), 1);
        assert_eq!(db.get_credentials_for("EOTHER").unwrap().len(), 1);
    }

    #[test]
    fn test_endorsement_revocation() {
        let db = db();
        let e = Endorsement {
            said: "EEND1".into(),
            endorser_id: "EA".into(),
            endorsee_id: "EB".into(),
            claim: "reliable collaborator".into(),
            confidence: 0.9,
            timestamp: 1_700_000_000,
            revoked: false,
            revoked_at: None,
            revocation_said: None,
            revocation_reason: None,
        };
        db.upsert_endorsement(&e).unwrap();

        assert!(db
            .mark_endorsement_revoked("EEND1", "EREV1", Some("retracted"), 1_700_000_100)
            .unwrap());
        assert!(!db
            .mark_endorsement_revoked("EMISSING", "EREV2", None, 0)
            .unwrap());

        let got = db.get_endorsement("EEND1").unwrap().unwrap();
        assert!(got.revoked);
        assert_eq!(got.revocation_said.as_deref(), Some("EREV1"));

        assert_eq!(db.endorsements_for("EB").unwrap().len(), 1);
        assert_eq!(db.endorsements_issued_by("EA").unwrap().len(), 1);
        assert!(db.endorsements_for("EA").unwrap().is_empty());
    }

    #[test]
    fn test_kel_idempotent_per_sequence() {
        let db = db();

        assert!(db.insert_kel_event("EAID", 0, "{\"t\":\"icp\"}").unwrap());
        assert!(!db.insert_kel_event("EAID", 0, "{\"t\":\"icp\"}").unwrap());
        assert!(db.insert_kel_event("EAID", 1, "{\"t\":\"rot\"}").unwrap());

        let log = db.kel_for("EAID").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sequence, 0);
        assert_eq!(log[1].sequence, 1);
    }

    #[test]
    fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let db = Database::open(Some(&path)).unwrap();
            db.insert_credential(&credential("ESAID001")).unwrap();
        }

        let db = Database::open(Some(&path)).unwrap();
        assert!(db.get_credential("ESAID001").unwrap().is_some());
    }
}
