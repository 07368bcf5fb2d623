//! # Storage
//!
//! The embedded cache database backing this node.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      EMBEDDED DATABASE                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  spaces        space_id → owner, type, keys-on-disk, created_at     │
//! │  credentials   credential cache keyed by SAID (trust graph source)  │
//! │  endorsements  endorsement cache with revocation bookkeeping        │
//! │  kel_events    key-event-log cache keyed by (aid, sequence)         │
//! │                                                                     │
//! │  One SQLite file under {data_dir}; in-memory for tests.             │
//! │  Writers serialise on a single connection mutex.                    │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything in here is a cache of replicated or derivable state except
//! the `spaces` table, which is the durable record of which spaces this
//! node owns keys for.

mod database;
pub mod schema;

pub use database::{Database, KelEventRecord, SpaceRecord};
