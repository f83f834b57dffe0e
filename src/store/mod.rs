//! Source store abstractions.
//!
//! The store is both the system of record for source tables and the
//! persistence layer for derived index state:
//!
//! - source tables with change tracking (the change feed is the only
//!   serialization point for concurrent row mutations)
//! - the endpoint and index-spec registries
//! - persisted index entries and sync checkpoints (the HNSW graph is a
//!   derived structure, rebuilt from these on open)
//!
//! The trait seam allows alternative backends; the primary implementation
//! is [`RedbStore`].

pub mod redb;
pub mod schema;

pub use self::redb::RedbStore;
pub use schema::{
    EndpointMeta, IndexCheckpoint, StoreMetadata, TableMeta, TableSpec, SCHEMA_VERSION,
};

use std::path::Path;

use crate::error::Result;
use crate::feed::ChangeEvent;
use crate::index::IndexSpec;
use crate::types::{IndexEntry, Record, RecordId, SequencePosition};

/// Storage backend contract.
///
/// Implementations must be `Send + Sync`; the engine handles internal
/// synchronization. Every mutating method opens and commits its own write
/// transaction, so each call is atomic on its own.
pub trait SourceStore: Send + Sync {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns the store metadata.
    fn metadata(&self) -> &StoreMetadata;

    /// Flushes pending writes to disk.
    ///
    /// The redb backend is durable on commit, so this is a no-op there;
    /// other backends may buffer.
    fn flush(&self) -> Result<()>;

    /// Returns the path to the store file, if applicable.
    fn path(&self) -> Option<&Path>;

    // =========================================================================
    // Source tables
    // =========================================================================

    /// Creates or overwrites a named table from a set of records.
    ///
    /// Overwriting drops previous rows, resets change tracking to disabled,
    /// and truncates the table's change feed. Initial rows do not generate
    /// change events; an index's initial build scans the table instead.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the records contain a duplicate key.
    fn create_table(&self, spec: &TableSpec, records: &[Record]) -> Result<()>;

    /// Returns the stored metadata for a table, or `None` if it doesn't exist.
    fn table_meta(&self, table: &str) -> Result<Option<TableMeta>>;

    /// Enables change tracking on a table. Idempotent.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the table doesn't exist.
    fn enable_change_tracking(&self, table: &str) -> Result<()>;

    /// Returns all records of a table, ordered by primary key.
    fn scan_records(&self, table: &str) -> Result<Vec<Record>>;

    /// Returns a single record by primary key.
    fn get_record(&self, table: &str, key: RecordId) -> Result<Option<Record>>;

    /// Inserts or updates a record, appending a change event when tracking
    /// is enabled.
    ///
    /// Returns the table's change-feed position after the write.
    fn upsert_record(&self, table: &str, record: &Record) -> Result<SequencePosition>;

    /// Deletes a record by primary key, appending a delete event when
    /// tracking is enabled.
    ///
    /// Returns `None` if the record did not exist (no event is appended).
    fn delete_record(&self, table: &str, key: RecordId) -> Result<Option<SequencePosition>>;

    // =========================================================================
    // Change feed
    // =========================================================================

    /// Returns the position of the most recent change event for a table.
    fn current_position(&self, table: &str) -> Result<SequencePosition>;

    /// Reads up to `limit` change events strictly after `after`, in
    /// position order.
    fn read_changes(
        &self,
        table: &str,
        after: SequencePosition,
        limit: usize,
    ) -> Result<Vec<ChangeEvent>>;

    // =========================================================================
    // Endpoint and index registries
    // =========================================================================

    /// Registers an endpoint. Returns `false` if it already existed.
    fn save_endpoint(&self, meta: &EndpointMeta) -> Result<bool>;

    /// Lists all registered endpoints.
    fn list_endpoints(&self) -> Result<Vec<EndpointMeta>>;

    /// Persists an index spec under its fully qualified name.
    fn save_index_spec(&self, full_name: &str, spec: &IndexSpec) -> Result<()>;

    /// Loads all persisted index specs as `(full_name, spec)` pairs.
    fn load_index_specs(&self) -> Result<Vec<(String, IndexSpec)>>;

    // =========================================================================
    // Index entry persistence
    // =========================================================================

    /// Saves (upserts) an index entry.
    fn save_index_entry(&self, index: &str, entry: &IndexEntry) -> Result<()>;

    /// Deletes an index entry. Returns `false` if it didn't exist.
    fn delete_index_entry(&self, index: &str, key: RecordId) -> Result<bool>;

    /// Loads all entries of an index, ordered by primary key.
    fn load_index_entries(&self, index: &str) -> Result<Vec<IndexEntry>>;

    /// Loads the sync checkpoint for an index, if one has been written.
    fn load_checkpoint(&self, index: &str) -> Result<Option<IndexCheckpoint>>;

    /// Persists the sync checkpoint for an index.
    fn save_checkpoint(&self, index: &str, checkpoint: &IndexCheckpoint) -> Result<()>;

    /// Removes all entries and the checkpoint of an index.
    ///
    /// Used when an index is (re)built from scratch.
    fn clear_index(&self, index: &str) -> Result<()>;
}

/// Opens a storage engine at the given path.
///
/// This is a convenience function that creates a [`RedbStore`] instance.
/// For more control, use `RedbStore::open()` directly.
///
/// # Errors
///
/// Returns an error if:
/// - The store file is corrupted
/// - The store is locked by another process
/// - The schema version doesn't match
pub fn open_store(path: impl AsRef<Path>) -> Result<Box<dyn SourceStore>> {
    let store = RedbStore::open(path)?;
    Ok(Box::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let store = open_store(&path).unwrap();

        assert_eq!(store.metadata().schema_version, SCHEMA_VERSION);
        assert!(store.path().is_some());
        store.flush().unwrap();
    }

    #[test]
    fn test_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedbStore>();
    }
}
