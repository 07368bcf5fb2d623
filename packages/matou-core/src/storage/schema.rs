//! # Database Schema
//!
//! SQL schema for the embedded cache database.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 3;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Spaces this node owns keys for
-- space_id is deterministic over the key set, so the row is idempotent
CREATE TABLE IF NOT EXISTS spaces (
    -- Deterministic space identifier
    space_id TEXT PRIMARY KEY,
    -- Owning identifier (user AID or org AID)
    owner_id TEXT NOT NULL,
    -- private | community | community-readonly | admin
    space_type TEXT NOT NULL,
    -- Path of the persisted key bundle relative to the data dir
    keys_path TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_spaces_owner ON spaces(owner_id);

-- Credential cache (source of the trust graph)
CREATE TABLE IF NOT EXISTS credentials (
    -- Self-addressing identifier; byte-level dedup key
    said TEXT PRIMARY KEY,
    issuer_id TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    schema_id TEXT NOT NULL,
    -- Opaque credential body (JSON)
    data TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    signature TEXT,
    expires_at INTEGER,
    received_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_credentials_recipient ON credentials(recipient_id);
CREATE INDEX IF NOT EXISTS idx_credentials_issuer ON credentials(issuer_id);

-- Endorsement cache
CREATE TABLE IF NOT EXISTS endorsements (
    said TEXT PRIMARY KEY,
    endorser_id TEXT NOT NULL,
    endorsee_id TEXT NOT NULL,
    claim TEXT NOT NULL,
    confidence REAL NOT NULL,
    timestamp INTEGER NOT NULL,
    revoked INTEGER NOT NULL DEFAULT 0,
    revoked_at INTEGER,
    revocation_said TEXT,
    revocation_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_endorsements_endorsee ON endorsements(endorsee_id);
CREATE INDEX IF NOT EXISTS idx_endorsements_endorser ON endorsements(endorser_id);

-- Key event log cache, append-only per identifier
CREATE TABLE IF NOT EXISTS kel_events (
    aid TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    -- Raw key event (JSON), stored verbatim
    event TEXT NOT NULL,
    received_at INTEGER NOT NULL,
    PRIMARY KEY (aid, sequence)
);
"#;
