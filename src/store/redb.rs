//! redb storage engine implementation.
//!
//! This module provides the primary storage backend for deltasearch using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery
//!
//! Each mutating method opens and commits its own write transaction. Row
//! mutation and change-event append happen in the same transaction, so the
//! feed can never disagree with the table contents.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ::redb::{Database, ReadableTable};
use tracing::{debug, info, instrument, warn};

use super::schema::{
    EndpointMeta, IndexCheckpoint, StoreMetadata, TableMeta, TableSpec, CHANGE_LOG_TABLE,
    ENDPOINTS_TABLE, INDEX_ENTRIES_TABLE, INDEX_SPECS_TABLE, INDEX_STATE_TABLE, METADATA_TABLE,
    RECORDS_TABLE, SCHEMA_VERSION, TABLES_TABLE,
};
use super::SourceStore;
use crate::error::{DeltaSearchError, Result, StorageError};
use crate::feed::ChangeEvent;
use crate::index::IndexSpec;
use crate::types::{IndexEntry, Record, RecordId, SequencePosition};

/// Metadata key in the metadata table.
const METADATA_KEY: &str = "store_metadata";

/// redb storage engine wrapper.
///
/// Holds the redb database handle and cached metadata, and implements
/// [`SourceStore`].
///
/// # Thread Safety
///
/// `RedbStore` is `Send + Sync`. redb handles internal synchronization
/// using MVCC for readers and exclusive locking for writers.
#[derive(Debug)]
pub struct RedbStore {
    /// The redb database handle.
    db: Database,

    /// Cached store metadata.
    metadata: StoreMetadata,

    /// Path to the store file.
    path: PathBuf,
}

impl RedbStore {
    /// Opens or creates a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The store file is corrupted
    /// - The store is locked by another process
    /// - The schema version doesn't match
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store_exists = path.exists();

        debug!(store_exists, "Opening storage engine");

        let db = Self::create_database(path)?;

        if store_exists {
            Self::open_existing(db, path.to_path_buf())
        } else {
            Self::initialize_new(db, path.to_path_buf())
        }
    }

    /// Creates the redb database handle.
    fn create_database(path: &Path) -> Result<Database> {
        // Note: redb doesn't expose a typed error variant for lock conflicts,
        // so we detect them via error message string matching. This may need
        // updating if redb changes its error messages in a future version.
        let db = Database::builder().create(path).map_err(|e| {
            if e.to_string().contains("locked") {
                StorageError::DatabaseLocked
            } else {
                StorageError::Redb(e.to_string())
            }
        })?;

        debug!("Store file opened successfully");
        Ok(db)
    }

    /// Initializes a new store with tables and metadata.
    #[instrument(skip(db), fields(path = %path.display()))]
    fn initialize_new(db: Database, path: PathBuf) -> Result<Self> {
        info!("Initializing new store");

        let metadata = StoreMetadata::new();

        // Create all tables and write metadata in a single transaction
        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_json = serde_json::to_vec(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_json.as_slice())?;

            // Create other tables (they're created on first access)
            let _ = write_txn.open_table(TABLES_TABLE)?;
            let _ = write_txn.open_table(RECORDS_TABLE)?;
            let _ = write_txn.open_table(CHANGE_LOG_TABLE)?;
            let _ = write_txn.open_table(ENDPOINTS_TABLE)?;
            let _ = write_txn.open_table(INDEX_SPECS_TABLE)?;
            let _ = write_txn.open_table(INDEX_ENTRIES_TABLE)?;
            let _ = write_txn.open_table(INDEX_STATE_TABLE)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(schema_version = SCHEMA_VERSION, "Store initialized");

        Ok(Self { db, metadata, path })
    }

    /// Opens and validates an existing store.
    #[instrument(skip(db), fields(path = %path.display()))]
    fn open_existing(db: Database, path: PathBuf) -> Result<Self> {
        info!("Opening existing store");

        let read_txn = db.begin_read().map_err(StorageError::from)?;

        let metadata = {
            let meta_table = read_txn.open_table(METADATA_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open metadata table: {}", e))
            })?;

            let metadata_bytes = meta_table
                .get(METADATA_KEY)
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted("Missing store metadata"))?;

            serde_json::from_slice::<StoreMetadata>(metadata_bytes.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?
        };

        drop(read_txn);

        if metadata.schema_version != SCHEMA_VERSION {
            warn!(
                expected = SCHEMA_VERSION,
                found = metadata.schema_version,
                "Schema version mismatch"
            );
            return Err(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: metadata.schema_version,
            }
            .into());
        }

        // Update last_opened_at timestamp
        let mut metadata = metadata;
        metadata.touch();

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_json = serde_json::to_vec(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_json.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = metadata.schema_version,
            "Store opened successfully"
        );

        Ok(Self { db, metadata, path })
    }

    /// Reads a table's metadata within any readable table handle.
    fn decode_table_meta(bytes: &[u8]) -> Result<TableMeta> {
        bincode::deserialize(bytes)
            .map_err(|e| StorageError::corrupted(format!("Invalid table metadata: {}", e)).into())
    }

    fn unknown_table(table: &str) -> DeltaSearchError {
        DeltaSearchError::invalid_argument(format!("unknown table '{}'", table))
    }
}

impl SourceStore for RedbStore {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    fn flush(&self) -> Result<()> {
        // redb commits are durable; nothing buffered outside transactions
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    // =========================================================================
    // Source tables
    // =========================================================================

    #[instrument(skip(self, records), fields(table = %spec.name, records = records.len()))]
    fn create_table(&self, spec: &TableSpec, records: &[Record]) -> Result<()> {
        // Reject duplicate keys before touching storage
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.key) {
                return Err(DeltaSearchError::invalid_argument(format!(
                    "duplicate primary key {} in table '{}'",
                    record.key, spec.name
                )));
            }
        }

        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut records_table = write_txn.open_table(RECORDS_TABLE)?;
            let mut log_table = write_txn.open_table(CHANGE_LOG_TABLE)?;
            let mut tables_table = write_txn.open_table(TABLES_TABLE)?;

            let name = spec.name.as_str();
            let previous = match tables_table.get(name).map_err(StorageError::from)? {
                Some(bytes) => Some(Self::decode_table_meta(bytes.value())?),
                None => None,
            };

            let old_keys: Vec<i64> = records_table
                .range((name, i64::MIN)..=(name, i64::MAX))?
                .filter_map(|row| row.ok().map(|(k, _)| k.value().1))
                .collect();
            for key in &old_keys {
                records_table.remove((name, *key))?;
            }

            // Overwriting a tracked table must not rewind the feed: a
            // consumer checkpointed past the truncation point would never
            // see the new rows. The overwrite itself flows through the
            // feed instead, as delete events for the dropped rows followed
            // by insert events for the new ones. Untracked tables carry no
            // consumers, so they start over.
            let mut meta = match previous {
                Some(prev) if prev.change_tracking => {
                    let mut meta = prev;
                    meta.spec = spec.clone();
                    for key in &old_keys {
                        let seq = meta.position.next();
                        let event = ChangeEvent::delete(seq, RecordId::new(*key));
                        let event_bytes =
                            bincode::serialize(&event).map_err(StorageError::from)?;
                        log_table.insert((name, seq.as_u64()), event_bytes.as_slice())?;
                        meta.position = seq;
                    }
                    meta
                }
                _ => {
                    let old_seqs: Vec<u64> = log_table
                        .range((name, 0u64)..=(name, u64::MAX))?
                        .filter_map(|row| row.ok().map(|(k, _)| k.value().1))
                        .collect();
                    for seq in old_seqs {
                        log_table.remove((name, seq))?;
                    }
                    TableMeta::new(spec.clone())
                }
            };

            for record in records {
                let bytes = bincode::serialize(record).map_err(StorageError::from)?;
                records_table.insert((name, record.key.as_i64()), bytes.as_slice())?;

                if meta.change_tracking {
                    let seq = meta.position.next();
                    let event = ChangeEvent::insert(seq, record.key, record.text.clone());
                    let event_bytes = bincode::serialize(&event).map_err(StorageError::from)?;
                    log_table.insert((name, seq.as_u64()), event_bytes.as_slice())?;
                    meta.position = seq;
                }
            }

            let meta_bytes = bincode::serialize(&meta).map_err(StorageError::from)?;
            tables_table.insert(name, meta_bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!("Table created");
        Ok(())
    }

    fn table_meta(&self, table: &str) -> Result<Option<TableMeta>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let tables_table = read_txn.open_table(TABLES_TABLE)?;
        match tables_table.get(table).map_err(StorageError::from)? {
            Some(bytes) => Ok(Some(Self::decode_table_meta(bytes.value())?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    fn enable_change_tracking(&self, table: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut tables_table = write_txn.open_table(TABLES_TABLE)?;
            let mut meta = match tables_table.get(table).map_err(StorageError::from)? {
                Some(bytes) => Self::decode_table_meta(bytes.value())?,
                None => return Err(Self::unknown_table(table)),
            };

            if !meta.change_tracking {
                meta.change_tracking = true;
                let bytes = bincode::serialize(&meta).map_err(StorageError::from)?;
                tables_table.insert(table, bytes.as_slice())?;
                debug!("Change tracking enabled");
            }
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn scan_records(&self, table: &str) -> Result<Vec<Record>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        {
            let tables_table = read_txn.open_table(TABLES_TABLE)?;
            if tables_table.get(table).map_err(StorageError::from)?.is_none() {
                return Err(Self::unknown_table(table));
            }
        }

        let records_table = read_txn.open_table(RECORDS_TABLE)?;
        let mut records = Vec::new();
        for row in records_table.range((table, i64::MIN)..=(table, i64::MAX))? {
            let (_, value) = row.map_err(StorageError::from)?;
            let record: Record = bincode::deserialize(value.value()).map_err(StorageError::from)?;
            records.push(record);
        }
        Ok(records)
    }

    fn get_record(&self, table: &str, key: RecordId) -> Result<Option<Record>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let records_table = read_txn.open_table(RECORDS_TABLE)?;
        match records_table
            .get((table, key.as_i64()))
            .map_err(StorageError::from)?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(bytes.value()).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, record), fields(key = %record.key))]
    fn upsert_record(&self, table: &str, record: &Record) -> Result<SequencePosition> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        let position;
        {
            let mut tables_table = write_txn.open_table(TABLES_TABLE)?;
            let mut records_table = write_txn.open_table(RECORDS_TABLE)?;
            let mut log_table = write_txn.open_table(CHANGE_LOG_TABLE)?;

            let mut meta = match tables_table.get(table).map_err(StorageError::from)? {
                Some(bytes) => Self::decode_table_meta(bytes.value())?,
                None => return Err(Self::unknown_table(table)),
            };

            let existed = records_table
                .get((table, record.key.as_i64()))
                .map_err(StorageError::from)?
                .is_some();

            let bytes = bincode::serialize(record).map_err(StorageError::from)?;
            records_table.insert((table, record.key.as_i64()), bytes.as_slice())?;

            if meta.change_tracking {
                let seq = meta.position.next();
                let event = if existed {
                    ChangeEvent::update(seq, record.key, record.text.clone())
                } else {
                    ChangeEvent::insert(seq, record.key, record.text.clone())
                };
                let event_bytes = bincode::serialize(&event).map_err(StorageError::from)?;
                log_table.insert((table, seq.as_u64()), event_bytes.as_slice())?;

                meta.position = seq;
                let meta_bytes = bincode::serialize(&meta).map_err(StorageError::from)?;
                tables_table.insert(table, meta_bytes.as_slice())?;
            }
            position = meta.position;
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(position)
    }

    #[instrument(skip(self))]
    fn delete_record(&self, table: &str, key: RecordId) -> Result<Option<SequencePosition>> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        let position;
        {
            let mut tables_table = write_txn.open_table(TABLES_TABLE)?;
            let mut records_table = write_txn.open_table(RECORDS_TABLE)?;
            let mut log_table = write_txn.open_table(CHANGE_LOG_TABLE)?;

            let mut meta = match tables_table.get(table).map_err(StorageError::from)? {
                Some(bytes) => Self::decode_table_meta(bytes.value())?,
                None => return Err(Self::unknown_table(table)),
            };

            let removed = records_table
                .remove((table, key.as_i64()))
                .map_err(StorageError::from)?
                .is_some();
            if !removed {
                return Ok(None);
            }

            if meta.change_tracking {
                let seq = meta.position.next();
                let event = ChangeEvent::delete(seq, key);
                let event_bytes = bincode::serialize(&event).map_err(StorageError::from)?;
                log_table.insert((table, seq.as_u64()), event_bytes.as_slice())?;

                meta.position = seq;
                let meta_bytes = bincode::serialize(&meta).map_err(StorageError::from)?;
                tables_table.insert(table, meta_bytes.as_slice())?;
            }
            position = meta.position;
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(Some(position))
    }

    // =========================================================================
    // Change feed
    // =========================================================================

    fn current_position(&self, table: &str) -> Result<SequencePosition> {
        match self.table_meta(table)? {
            Some(meta) => Ok(meta.position),
            None => Err(Self::unknown_table(table)),
        }
    }

    fn read_changes(
        &self,
        table: &str,
        after: SequencePosition,
        limit: usize,
    ) -> Result<Vec<ChangeEvent>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let log_table = read_txn.open_table(CHANGE_LOG_TABLE)?;

        let start = after.as_u64().saturating_add(1);
        let mut events = Vec::new();
        for row in log_table.range((table, start)..=(table, u64::MAX))? {
            if events.len() >= limit {
                break;
            }
            let (_, value) = row.map_err(StorageError::from)?;
            let event: ChangeEvent =
                bincode::deserialize(value.value()).map_err(StorageError::from)?;
            events.push(event);
        }
        Ok(events)
    }

    // =========================================================================
    // Endpoint and index registries
    // =========================================================================

    fn save_endpoint(&self, meta: &EndpointMeta) -> Result<bool> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        let created;
        {
            let mut endpoints_table = write_txn.open_table(ENDPOINTS_TABLE)?;
            created = endpoints_table
                .get(meta.name.as_str())
                .map_err(StorageError::from)?
                .is_none();
            if created {
                let bytes = bincode::serialize(meta).map_err(StorageError::from)?;
                endpoints_table.insert(meta.name.as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(created)
    }

    fn list_endpoints(&self) -> Result<Vec<EndpointMeta>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let endpoints_table = read_txn.open_table(ENDPOINTS_TABLE)?;
        let mut endpoints = Vec::new();
        for row in endpoints_table.iter().map_err(StorageError::from)? {
            let (_, value) = row.map_err(StorageError::from)?;
            let meta: EndpointMeta =
                bincode::deserialize(value.value()).map_err(StorageError::from)?;
            endpoints.push(meta);
        }
        Ok(endpoints)
    }

    fn save_index_spec(&self, full_name: &str, spec: &IndexSpec) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut specs_table = write_txn.open_table(INDEX_SPECS_TABLE)?;
            let bytes = bincode::serialize(spec).map_err(StorageError::from)?;
            specs_table.insert(full_name, bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn load_index_specs(&self) -> Result<Vec<(String, IndexSpec)>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let specs_table = read_txn.open_table(INDEX_SPECS_TABLE)?;
        let mut specs = Vec::new();
        for row in specs_table.iter().map_err(StorageError::from)? {
            let (key, value) = row.map_err(StorageError::from)?;
            let spec: IndexSpec =
                bincode::deserialize(value.value()).map_err(StorageError::from)?;
            specs.push((key.value().to_string(), spec));
        }
        Ok(specs)
    }

    // =========================================================================
    // Index entry persistence
    // =========================================================================

    fn save_index_entry(&self, index: &str, entry: &IndexEntry) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut entries_table = write_txn.open_table(INDEX_ENTRIES_TABLE)?;
            let bytes = bincode::serialize(entry).map_err(StorageError::from)?;
            entries_table.insert((index, entry.key.as_i64()), bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn delete_index_entry(&self, index: &str, key: RecordId) -> Result<bool> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        let removed;
        {
            let mut entries_table = write_txn.open_table(INDEX_ENTRIES_TABLE)?;
            removed = entries_table
                .remove((index, key.as_i64()))
                .map_err(StorageError::from)?
                .is_some();
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(removed)
    }

    fn load_index_entries(&self, index: &str) -> Result<Vec<IndexEntry>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let entries_table = read_txn.open_table(INDEX_ENTRIES_TABLE)?;
        let mut entries = Vec::new();
        for row in entries_table.range((index, i64::MIN)..=(index, i64::MAX))? {
            let (_, value) = row.map_err(StorageError::from)?;
            let entry: IndexEntry =
                bincode::deserialize(value.value()).map_err(StorageError::from)?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn load_checkpoint(&self, index: &str) -> Result<Option<IndexCheckpoint>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let state_table = read_txn.open_table(INDEX_STATE_TABLE)?;
        match state_table.get(index).map_err(StorageError::from)? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(bytes.value()).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }

    fn save_checkpoint(&self, index: &str, checkpoint: &IndexCheckpoint) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut state_table = write_txn.open_table(INDEX_STATE_TABLE)?;
            let bytes = bincode::serialize(checkpoint).map_err(StorageError::from)?;
            state_table.insert(index, bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn clear_index(&self, index: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut entries_table = write_txn.open_table(INDEX_ENTRIES_TABLE)?;
            let keys: Vec<i64> = entries_table
                .range((index, i64::MIN)..=(index, i64::MAX))?
                .filter_map(|row| row.ok().map(|(k, _)| k.value().1))
                .collect();
            for key in keys {
                entries_table.remove((index, key))?;
            }

            let mut state_table = write_txn.open_table(INDEX_STATE_TABLE)?;
            state_table.remove(index).map_err(StorageError::from)?;
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ChangeOp;
    use tempfile::tempdir;

    fn open_test_store() -> (tempfile::TempDir, RedbStore) {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn faq_spec() -> TableSpec {
        TableSpec::new("billing_faq_dataset", "index", "faq")
    }

    #[test]
    fn test_open_creates_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = RedbStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.metadata().schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_reopen_existing_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let _store = RedbStore::open(&path).unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert!(store.metadata().is_compatible());
    }

    #[test]
    fn test_create_table_and_scan() {
        let (_dir, store) = open_test_store();
        let records = vec![Record::new(1, "alpha"), Record::new(2, "beta")];
        store.create_table(&faq_spec(), &records).unwrap();

        let scanned = store.scan_records("billing_faq_dataset").unwrap();
        assert_eq!(scanned, records);
    }

    #[test]
    fn test_create_table_rejects_duplicate_keys() {
        let (_dir, store) = open_test_store();
        let records = vec![Record::new(1, "a"), Record::new(1, "b")];
        let err = store.create_table(&faq_spec(), &records).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_create_table_overwrites() {
        let (_dir, store) = open_test_store();
        store
            .create_table(&faq_spec(), &[Record::new(1, "old"), Record::new(2, "old")])
            .unwrap();
        store
            .create_table(&faq_spec(), &[Record::new(3, "new")])
            .unwrap();

        let scanned = store.scan_records("billing_faq_dataset").unwrap();
        assert_eq!(scanned, vec![Record::new(3, "new")]);
        // Without tracking there are no consumers, so the feed resets
        assert_eq!(
            store.current_position("billing_faq_dataset").unwrap(),
            SequencePosition::START
        );
    }

    #[test]
    fn test_overwrite_of_tracked_table_flows_through_the_feed() {
        let (_dir, store) = open_test_store();
        let table = "billing_faq_dataset";
        store
            .create_table(&faq_spec(), &[Record::new(1, "old a"), Record::new(2, "old b")])
            .unwrap();
        store.enable_change_tracking(table).unwrap();
        let before = store.current_position(table).unwrap();

        store
            .create_table(&faq_spec(), &[Record::new(9, "replacement")])
            .unwrap();

        // Tracking and the position survive; the old rows leave as delete
        // events and the new row arrives as an insert, so a consumer
        // checkpointed at `before` converges on the new contents.
        store
            .upsert_record(table, &Record::new(10, "after overwrite"))
            .unwrap();
        let events = store.read_changes(table, before, 100).unwrap();
        let ops: Vec<ChangeOp> = events.iter().map(|e| e.op).collect();
        assert_eq!(
            ops,
            vec![
                ChangeOp::Delete,
                ChangeOp::Delete,
                ChangeOp::Insert,
                ChangeOp::Insert
            ]
        );
        assert_eq!(events[0].key, RecordId::new(1));
        assert_eq!(events[1].key, RecordId::new(2));
        assert_eq!(events[2].key, RecordId::new(9));
        assert_eq!(events[3].key, RecordId::new(10));
    }

    #[test]
    fn test_scan_unknown_table() {
        let (_dir, store) = open_test_store();
        let err = store.scan_records("missing").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_mutations_without_tracking_emit_no_events() {
        let (_dir, store) = open_test_store();
        store.create_table(&faq_spec(), &[]).unwrap();

        store
            .upsert_record("billing_faq_dataset", &Record::new(1, "hello"))
            .unwrap();

        let events = store
            .read_changes("billing_faq_dataset", SequencePosition::START, 100)
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_change_feed_orders_events() {
        let (_dir, store) = open_test_store();
        let table = "billing_faq_dataset";
        store.create_table(&faq_spec(), &[]).unwrap();
        store.enable_change_tracking(table).unwrap();

        store.upsert_record(table, &Record::new(1, "a")).unwrap();
        store.upsert_record(table, &Record::new(1, "b")).unwrap();
        store.delete_record(table, RecordId::new(1)).unwrap();

        let events = store
            .read_changes(table, SequencePosition::START, 100)
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].op, ChangeOp::Insert);
        assert_eq!(events[1].op, ChangeOp::Update);
        assert_eq!(events[2].op, ChangeOp::Delete);
        // Strictly increasing positions
        assert!(events[0].seq < events[1].seq);
        assert!(events[1].seq < events[2].seq);
        assert_eq!(store.current_position(table).unwrap(), events[2].seq);
    }

    #[test]
    fn test_read_changes_after_position() {
        let (_dir, store) = open_test_store();
        let table = "billing_faq_dataset";
        store.create_table(&faq_spec(), &[]).unwrap();
        store.enable_change_tracking(table).unwrap();

        store.upsert_record(table, &Record::new(1, "a")).unwrap();
        let mid = store.upsert_record(table, &Record::new(2, "b")).unwrap();
        store.upsert_record(table, &Record::new(3, "c")).unwrap();

        let events = store.read_changes(table, mid, 100).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, RecordId::new(3));
    }

    #[test]
    fn test_delete_missing_record_returns_none() {
        let (_dir, store) = open_test_store();
        store.create_table(&faq_spec(), &[]).unwrap();
        let result = store
            .delete_record("billing_faq_dataset", RecordId::new(99))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_enable_change_tracking_is_idempotent() {
        let (_dir, store) = open_test_store();
        let table = "billing_faq_dataset";
        store.create_table(&faq_spec(), &[]).unwrap();
        store.enable_change_tracking(table).unwrap();
        store.upsert_record(table, &Record::new(1, "a")).unwrap();
        store.enable_change_tracking(table).unwrap();
        // Position preserved across the redundant enable
        assert_eq!(
            store.current_position(table).unwrap(),
            SequencePosition::new(1)
        );
    }

    #[test]
    fn test_endpoint_registry() {
        let (_dir, store) = open_test_store();
        assert!(store.save_endpoint(&EndpointMeta::new("shared")).unwrap());
        assert!(!store.save_endpoint(&EndpointMeta::new("shared")).unwrap());
        let endpoints = store.list_endpoints().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].name, "shared");
    }

    #[test]
    fn test_index_entry_persistence() {
        let (_dir, store) = open_test_store();
        let index = "main.default.faq_index";
        let entry = IndexEntry {
            key: RecordId::new(5),
            embedding: vec![0.5; 4],
            text: "hello".to_string(),
        };
        store.save_index_entry(index, &entry).unwrap();

        let entries = store.load_index_entries(index).unwrap();
        assert_eq!(entries, vec![entry]);

        assert!(store.delete_index_entry(index, RecordId::new(5)).unwrap());
        assert!(!store.delete_index_entry(index, RecordId::new(5)).unwrap());
        assert!(store.load_index_entries(index).unwrap().is_empty());
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let (_dir, store) = open_test_store();
        let index = "main.default.faq_index";
        assert!(store.load_checkpoint(index).unwrap().is_none());

        let cp = IndexCheckpoint {
            applied: SequencePosition::new(3),
            dimension: 256,
        };
        store.save_checkpoint(index, &cp).unwrap();
        assert_eq!(store.load_checkpoint(index).unwrap(), Some(cp));
    }

    #[test]
    fn test_clear_index() {
        let (_dir, store) = open_test_store();
        let index = "main.default.faq_index";
        store
            .save_index_entry(
                index,
                &IndexEntry {
                    key: RecordId::new(1),
                    embedding: vec![0.1; 4],
                    text: "x".to_string(),
                },
            )
            .unwrap();
        store
            .save_checkpoint(
                index,
                &IndexCheckpoint {
                    applied: SequencePosition::new(1),
                    dimension: 4,
                },
            )
            .unwrap();

        store.clear_index(index).unwrap();
        assert!(store.load_index_entries(index).unwrap().is_empty());
        assert!(store.load_checkpoint(index).unwrap().is_none());
    }

    #[test]
    fn test_entries_isolated_per_index() {
        let (_dir, store) = open_test_store();
        let entry = IndexEntry {
            key: RecordId::new(1),
            embedding: vec![0.1; 4],
            text: "x".to_string(),
        };
        store.save_index_entry("a.b.first", &entry).unwrap();
        assert!(store.load_index_entries("a.b.second").unwrap().is_empty());
    }
}
