//! Main DeltaSearch facade.
//!
//! [`DeltaSearch`] owns the store, the embedding oracle, and the registry
//! of delta-sync indexes. It is the one type an application needs:
//!
//! ```rust,no_run
//! use deltasearch::{Config, DeltaSearch, IndexSpec, Record, SearchMode, TableSpec, TriggerMode};
//!
//! # fn main() -> deltasearch::Result<()> {
//! let db = DeltaSearch::open("./delta.db", Config::default())?;
//!
//! db.create_table(
//!     &TableSpec::new("billing_faq_dataset", "index", "faq"),
//!     &[Record::new(1, "Q: How do I pay my bill? A: Online or by phone.")],
//! )?;
//! db.enable_change_tracking("billing_faq_dataset")?;
//!
//! db.create_endpoint("shared-endpoint")?;
//! let index = db.create_index(IndexSpec {
//!     name: "billing_faq_index".to_string(),
//!     endpoint: "shared-endpoint".to_string(),
//!     source_table: "billing_faq_dataset".to_string(),
//!     primary_key: "index".to_string(),
//!     embedding_source_column: "faq".to_string(),
//!     trigger_mode: TriggerMode::Triggered,
//! })?;
//!
//! index.wait_until_online(&db.config().poll)?;
//! let results = index.search("How do I pay my bill?", 5, SearchMode::Ann)?;
//! # let _ = results;
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Endpoint and index creation are idempotent: creating something that
//! already exists logs a note and returns the existing resource instead of
//! failing, so setup code can run unconditionally.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::embedding::{create_oracle, EmbeddingOracle};
use crate::error::{DeltaSearchError, Result};
use crate::index::{DeltaSyncIndex, IndexSpec, IndexStatus};
use crate::search::{SearchMode, SearchResult};
use crate::store::{EndpointMeta, RedbStore, SourceStore, TableSpec};
use crate::types::{Record, RecordId, SequencePosition};

/// The synchronized embedding-index manager.
///
/// Cheap to share: internal registries are behind locks and indexes are
/// `Arc`-shared handles. One `DeltaSearch` owns one store file.
pub struct DeltaSearch {
    store: Arc<dyn SourceStore>,
    oracle: Arc<dyn EmbeddingOracle>,
    config: Config,
    indexes: RwLock<HashMap<String, Arc<DeltaSyncIndex>>>,
}

impl DeltaSearch {
    /// Opens (or creates) a store and re-creates handles for every
    /// persisted index.
    ///
    /// The oracle is built from `config.oracle`; use
    /// [`open_with_oracle`](Self::open_with_oracle) to supply your own.
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let oracle = create_oracle(&config.oracle);
        Self::open_with_oracle(path, config, oracle)
    }

    /// Opens a store with a caller-supplied embedding oracle.
    ///
    /// # Errors
    /// Returns a `Config` error if the oracle's dimension disagrees with
    /// `config.oracle`.
    pub fn open_with_oracle(
        path: impl AsRef<Path>,
        config: Config,
        oracle: Arc<dyn EmbeddingOracle>,
    ) -> Result<Self> {
        config.validate()?;
        if oracle.dimension() != config.dimension() {
            return Err(DeltaSearchError::config(format!(
                "oracle produces {}-dimensional embeddings but the configuration declares {}",
                oracle.dimension(),
                config.dimension()
            )));
        }

        let store: Arc<dyn SourceStore> = Arc::new(RedbStore::open(path)?);

        let mut indexes = HashMap::new();
        for (full_name, spec) in store.load_index_specs()? {
            debug!(index = %full_name, "Restoring persisted index");
            let index = DeltaSyncIndex::reopen(
                full_name.clone(),
                spec,
                Arc::clone(&store),
                Arc::clone(&oracle),
                config.clone(),
            )?;
            indexes.insert(full_name, index);
        }

        if !indexes.is_empty() {
            info!(indexes = indexes.len(), "Restored persisted indexes");
        }

        Ok(Self {
            store,
            oracle,
            config,
            indexes: RwLock::new(indexes),
        })
    }

    /// The configuration this instance was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The embedding oracle in use.
    pub fn oracle(&self) -> &Arc<dyn EmbeddingOracle> {
        &self.oracle
    }

    // =========================================================================
    // Source tables
    // =========================================================================

    /// Creates (or overwrites) a source table with initial records.
    ///
    /// Initial records do not produce change events; an index built over
    /// the table picks them up in its initial scan.
    pub fn create_table(&self, spec: &TableSpec, records: &[Record]) -> Result<()> {
        if spec.name.is_empty() {
            return Err(DeltaSearchError::invalid_argument(
                "table name must not be empty",
            ));
        }
        self.store.create_table(spec, records)
    }

    /// Enables change tracking on a table. Idempotent.
    pub fn enable_change_tracking(&self, table: &str) -> Result<()> {
        self.store.enable_change_tracking(table)
    }

    /// Inserts or updates a record, returning the table's feed position.
    pub fn upsert_record(&self, table: &str, record: &Record) -> Result<SequencePosition> {
        self.store.upsert_record(table, record)
    }

    /// Deletes a record. Returns `None` if it did not exist.
    pub fn delete_record(&self, table: &str, key: RecordId) -> Result<Option<SequencePosition>> {
        self.store.delete_record(table, key)
    }

    /// Reads a record by primary key.
    pub fn get_record(&self, table: &str, key: RecordId) -> Result<Option<Record>> {
        self.store.get_record(table, key)
    }

    /// Reads all records of a table, ordered by primary key.
    pub fn scan_records(&self, table: &str) -> Result<Vec<Record>> {
        self.store.scan_records(table)
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    /// Registers a vector search endpoint. Idempotent: re-creating an
    /// existing endpoint logs a note and succeeds.
    #[instrument(skip(self))]
    pub fn create_endpoint(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(DeltaSearchError::invalid_argument(
                "endpoint name must not be empty",
            ));
        }
        let created = self.store.save_endpoint(&EndpointMeta::new(name))?;
        if created {
            info!("Endpoint created");
        } else {
            debug!("Endpoint already exists, nothing to do");
        }
        Ok(())
    }

    /// Lists registered endpoint names.
    pub fn list_endpoints(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_endpoints()?
            .into_iter()
            .map(|meta| meta.name)
            .collect())
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    /// Creates a delta-sync index and starts its initial build in the
    /// background.
    ///
    /// Idempotent: if an index with the same qualified name already exists,
    /// the existing handle is returned with a log note and no new build is
    /// started.
    ///
    /// # Errors
    /// `InvalidArgument` if the endpoint is unknown, the source table does
    /// not exist, the declared columns disagree with the table, or change
    /// tracking is not enabled on the table.
    #[instrument(skip(self, spec), fields(index = %spec.name))]
    pub fn create_index(&self, spec: IndexSpec) -> Result<Arc<DeltaSyncIndex>> {
        let full_name = self.config.namespace.qualify(&spec.name);

        {
            let indexes = self.read_indexes()?;
            if let Some(existing) = indexes.get(&full_name) {
                debug!(index = %full_name, "Index already exists, returning existing handle");
                return Ok(Arc::clone(existing));
            }
        }

        self.validate_index_spec(&spec)?;

        let mut indexes = self.write_indexes()?;
        // Lost a race with another creator: absorb, like the re-create case
        if let Some(existing) = indexes.get(&full_name) {
            debug!(index = %full_name, "Index already exists, returning existing handle");
            return Ok(Arc::clone(existing));
        }

        self.store.save_index_spec(&full_name, &spec)?;
        let index = DeltaSyncIndex::create(
            full_name.clone(),
            spec,
            Arc::clone(&self.store),
            Arc::clone(&self.oracle),
            self.config.clone(),
        )?;
        indexes.insert(full_name.clone(), Arc::clone(&index));
        info!(index = %full_name, "Index created, initial build started");
        Ok(index)
    }

    fn validate_index_spec(&self, spec: &IndexSpec) -> Result<()> {
        if spec.name.is_empty() {
            return Err(DeltaSearchError::invalid_argument(
                "index name must not be empty",
            ));
        }

        let endpoints = self.store.list_endpoints()?;
        if !endpoints.iter().any(|e| e.name == spec.endpoint) {
            return Err(DeltaSearchError::invalid_argument(format!(
                "unknown endpoint '{}'",
                spec.endpoint
            )));
        }

        let meta = self
            .store
            .table_meta(&spec.source_table)?
            .ok_or_else(|| {
                DeltaSearchError::invalid_argument(format!(
                    "unknown table '{}'",
                    spec.source_table
                ))
            })?;

        if meta.spec.primary_key_column != spec.primary_key {
            return Err(DeltaSearchError::invalid_argument(format!(
                "table '{}' declares primary key column '{}', not '{}'",
                spec.source_table, meta.spec.primary_key_column, spec.primary_key
            )));
        }
        if meta.spec.embedding_source_column != spec.embedding_source_column {
            return Err(DeltaSearchError::invalid_argument(format!(
                "table '{}' declares embedding source column '{}', not '{}'",
                spec.source_table, meta.spec.embedding_source_column, spec.embedding_source_column
            )));
        }
        if !meta.change_tracking {
            return Err(DeltaSearchError::invalid_argument(format!(
                "change tracking is not enabled on table '{}'",
                spec.source_table
            )));
        }

        Ok(())
    }

    /// Returns the handle for an index by unqualified name.
    ///
    /// # Errors
    /// `InvalidArgument` if no such index exists.
    pub fn get_index(&self, name: &str) -> Result<Arc<DeltaSyncIndex>> {
        let full_name = self.config.namespace.qualify(name);
        let indexes = self.read_indexes()?;
        indexes.get(&full_name).map(Arc::clone).ok_or_else(|| {
            DeltaSearchError::invalid_argument(format!("unknown index '{}'", full_name))
        })
    }

    /// Returns the status of an index by unqualified name.
    pub fn describe_index(&self, name: &str) -> Result<IndexStatus> {
        Ok(self.get_index(name)?.describe())
    }

    /// Runs one sync cycle on an index by unqualified name.
    pub fn sync_index(&self, name: &str) -> Result<u64> {
        self.get_index(name)?.sync()
    }

    /// Searches an index by unqualified name.
    pub fn search(
        &self,
        name: &str,
        query: &str,
        k: usize,
        mode: SearchMode,
    ) -> Result<Vec<SearchResult>> {
        self.get_index(name)?.search(query, k, mode)
    }

    /// Lists the fully qualified names of all open indexes.
    pub fn list_indexes(&self) -> Result<Vec<String>> {
        let indexes = self.read_indexes()?;
        let mut names: Vec<String> = indexes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stops background sync workers, waits for in-flight builds, and
    /// flushes the store.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        let indexes = self.read_indexes()?;
        for index in indexes.values() {
            index.shutdown();
        }
        drop(indexes);

        self.store.flush()?;
        info!("DeltaSearch closed");
        Ok(())
    }

    fn read_indexes(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<DeltaSyncIndex>>>> {
        self.indexes
            .read()
            .map_err(|_| DeltaSearchError::index_failed("index registry lock poisoned"))
    }

    fn write_indexes(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<DeltaSyncIndex>>>> {
        self.indexes
            .write()
            .map_err(|_| DeltaSearchError::index_failed("index registry lock poisoned"))
    }
}

impl std::fmt::Debug for DeltaSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaSearch")
            .field("path", &self.store.path())
            .field("dimension", &self.config.dimension())
            .finish_non_exhaustive()
    }
}
