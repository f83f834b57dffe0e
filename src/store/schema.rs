//! Store schema definitions and versioning.
//!
//! This module defines the table structure for the redb storage engine.
//! All table definitions are compile-time constants to ensure consistency.
//!
//! # Schema Versioning
//!
//! The schema version is stored in the metadata table. When opening an
//! existing store, we check the version and fail if it doesn't match.
//!
//! # Table Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE                                                │
//! │   Key: &str                                                   │
//! │   Value: &[u8] (JSON, human-readable)                         │
//! │   Entries: "store_metadata" -> StoreMetadata                  │
//! └──────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────┐
//! │ TABLES_TABLE            table name -> bincode TableMeta       │
//! │ RECORDS_TABLE           (table, key) -> bincode Record        │
//! │ CHANGE_LOG_TABLE        (table, seq) -> bincode ChangeEvent   │
//! │ ENDPOINTS_TABLE         endpoint name -> bincode EndpointMeta │
//! │ INDEX_SPECS_TABLE       index full name -> bincode IndexSpec  │
//! │ INDEX_ENTRIES_TABLE     (index, key) -> bincode IndexEntry    │
//! │ INDEX_STATE_TABLE       index full name -> IndexCheckpoint    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Composite keys are redb tuples; the table/index name prefix keeps each
//! logical table's rows in one contiguous, range-scannable region.

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::types::{SequencePosition, Timestamp};

/// Current schema version.
///
/// Increment this when making breaking changes to the schema.
/// The store will refuse to open if versions don't match.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table for store-level information.
///
/// Stores schema version and timestamps. Value is JSON so a stuck store can
/// be inspected with a hex dump and eyeballs.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Source table registry.
///
/// Key: table name
/// Value: bincode-serialized [`TableMeta`]
pub const TABLES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tables");

/// Source records.
///
/// Key: (table name, primary key)
/// Value: bincode-serialized [`Record`](crate::Record)
pub const RECORDS_TABLE: TableDefinition<(&str, i64), &[u8]> = TableDefinition::new("records");

/// Change feed log.
///
/// Key: (table name, sequence position)
/// Value: bincode-serialized [`ChangeEvent`](crate::ChangeEvent)
///
/// The u64 position component makes a range scan return events in commit
/// order, which is the order the syncer must apply them in.
pub const CHANGE_LOG_TABLE: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("change_log");

/// Vector search endpoint registry.
///
/// Key: endpoint name
/// Value: bincode-serialized [`EndpointMeta`]
pub const ENDPOINTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("endpoints");

/// Index spec registry, used to re-create index handles on open.
///
/// Key: fully qualified index name
/// Value: bincode-serialized [`IndexSpec`](crate::IndexSpec)
pub const INDEX_SPECS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("index_specs");

/// Persisted index entries (the source of truth the HNSW graph is rebuilt
/// from on open).
///
/// Key: (fully qualified index name, primary key)
/// Value: bincode-serialized [`IndexEntry`](crate::IndexEntry)
pub const INDEX_ENTRIES_TABLE: TableDefinition<(&str, i64), &[u8]> =
    TableDefinition::new("index_entries");

/// Per-index sync checkpoint.
///
/// Key: fully qualified index name
/// Value: bincode-serialized [`IndexCheckpoint`]
pub const INDEX_STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("index_state");

// ============================================================================
// Stored metadata types
// ============================================================================

/// Store metadata kept in the metadata table.
///
/// Serialized as JSON under the key "store_metadata".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Schema version for compatibility checking.
    pub schema_version: u32,

    /// Timestamp when the store was created.
    pub created_at: Timestamp,

    /// Last time the store was opened (updated on each open).
    pub last_opened_at: Timestamp,
}

impl StoreMetadata {
    /// Creates new metadata for a fresh store.
    pub fn new() -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates the last_opened_at timestamp.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// Checks if this metadata is compatible with the current schema.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Declared shape of a source table.
///
/// Column names are declared at creation and validated against index specs,
/// mirroring how a warehouse table carries its column contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name (unqualified; the store owns one namespace).
    pub name: String,
    /// Name of the unique, non-null integer primary key column.
    pub primary_key_column: String,
    /// Name of the text column designated for embedding.
    pub embedding_source_column: String,
}

impl TableSpec {
    /// Creates a table spec with the given column names.
    pub fn new(
        name: impl Into<String>,
        primary_key_column: impl Into<String>,
        embedding_source_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_key_column: primary_key_column.into(),
            embedding_source_column: embedding_source_column.into(),
        }
    }
}

/// Stored per-table state: the declared spec plus change-tracking state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    /// Declared table shape.
    pub spec: TableSpec,
    /// Whether row mutations append change events.
    pub change_tracking: bool,
    /// Position assigned to the most recent change event (0 = none yet).
    pub position: SequencePosition,
}

impl TableMeta {
    /// Creates metadata for a freshly created table (tracking disabled).
    pub fn new(spec: TableSpec) -> Self {
        Self {
            spec,
            change_tracking: false,
            position: SequencePosition::START,
        }
    }
}

/// Endpoint registry entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointMeta {
    /// Endpoint name.
    pub name: String,
    /// When the endpoint was created.
    pub created_at: Timestamp,
}

impl EndpointMeta {
    /// Creates an endpoint record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Timestamp::now(),
        }
    }
}

/// Per-index sync checkpoint persisted alongside index entries.
///
/// The applied position lets a reopened index resume delta sync instead of
/// re-embedding the whole table; the dimension pins the oracle contract the
/// stored embeddings were produced under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCheckpoint {
    /// Last change-feed position applied to the index.
    pub applied: SequencePosition,
    /// Embedding dimension of the stored entries.
    pub dimension: u32,
}
