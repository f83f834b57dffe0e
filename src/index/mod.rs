//! Delta-sync index lifecycle and sync engine.
//!
//! A [`DeltaSyncIndex`] mirrors one source table into an ANN index and
//! keeps it current by draining the table's change feed. Its lifecycle:
//!
//! ```text
//! PROVISIONING ──> SYNCING ──> ONLINE
//!       │             │          │ (incremental syncs keep it ONLINE)
//!       └─────────────┴──> FAILED
//! ```
//!
//! The initial build runs on a background thread, so `create_index`
//! returns immediately and callers observe the state machine through
//! [`describe`](DeltaSyncIndex::describe) or block on
//! [`wait_until_online`](DeltaSyncIndex::wait_until_online). PROVISIONING
//! and SYNCING belong to the initial build only: once online, incremental
//! syncs run without taking the index out of ONLINE, so queries keep
//! working while the feed drains.
//!
//! At most one sync cycle runs at a time per index. The build thread and
//! `sync()` contend on one mutex; a caller that loses reports a retryable
//! conflict rather than blocking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{Config, PollPolicy, TriggerMode};
use crate::embedding::EmbeddingOracle;
use crate::error::{DeltaSearchError, Result};
use crate::feed::ChangeEvent;
use crate::search::{self, SearchMode, SearchResult};
use crate::store::{IndexCheckpoint, SourceStore};
use crate::types::{IndexEntry, IndexState, RecordId, SequencePosition};
use crate::vector::{HnswIndex, VectorIndex};

/// Change events embedded and applied per checkpoint write.
const SYNC_BATCH_SIZE: usize = 256;

/// Declared shape of a delta-sync index, persisted in the spec registry so
/// handles can be re-created on open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Unqualified index name.
    pub name: String,
    /// Endpoint the index is served from.
    pub endpoint: String,
    /// Source table the index mirrors.
    pub source_table: String,
    /// Primary key column declared on the source table.
    pub primary_key: String,
    /// Text column embeddings are computed from.
    pub embedding_source_column: String,
    /// How sync cycles are triggered.
    pub trigger_mode: TriggerMode,
}

/// Point-in-time view of an index, as returned by `describe()`.
#[derive(Clone, Debug)]
pub struct IndexStatus {
    /// Fully qualified index name.
    pub name: String,
    /// Lifecycle state.
    pub state: IndexState,
    /// Number of live entries in the index.
    pub entries: usize,
    /// Last change-feed position applied.
    pub applied: SequencePosition,
    /// Failure message when the state is FAILED.
    pub failure: Option<String>,
}

impl IndexStatus {
    /// Returns true if the index can serve queries.
    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }
}

/// Lifecycle state guarded by one lock so state, failure message, and
/// applied position always change together.
#[derive(Debug)]
struct Lifecycle {
    state: IndexState,
    failure: Option<String>,
    applied: SequencePosition,
}

/// Background worker handles, populated once each thread is spawned.
#[derive(Default)]
struct Workers {
    build: Option<JoinHandle<()>>,
    sync: Option<(Sender<()>, JoinHandle<()>)>,
}

/// One synchronized ANN index over a source table.
///
/// Shared as `Arc<DeltaSyncIndex>`; the background build/sync threads and
/// the query path all hold the same instance.
pub struct DeltaSyncIndex {
    full_name: String,
    spec: IndexSpec,
    store: Arc<dyn SourceStore>,
    oracle: Arc<dyn EmbeddingOracle>,
    config: Config,

    /// The ANN graph, rebuilt from persisted entries on open.
    vector: HnswIndex,

    /// Indexed text per key, for result payloads and hybrid re-scoring.
    texts: RwLock<HashMap<RecordId, String>>,

    lifecycle: RwLock<Lifecycle>,

    /// Serializes sync cycles; the initial build holds it for its whole run.
    sync_lock: Mutex<()>,

    workers: Mutex<Workers>,
}

impl DeltaSyncIndex {
    /// Creates a fresh index in PROVISIONING and starts its initial build
    /// on a background thread.
    pub(crate) fn create(
        full_name: String,
        spec: IndexSpec,
        store: Arc<dyn SourceStore>,
        oracle: Arc<dyn EmbeddingOracle>,
        config: Config,
    ) -> Result<Arc<Self>> {
        let hnsw_config = config.hnsw.clone();
        let index = Arc::new(Self::construct(
            full_name,
            spec,
            store,
            oracle,
            config,
            IndexState::Provisioning,
            SequencePosition::START,
            move |dim| Ok(HnswIndex::new(dim, &hnsw_config)),
        )?);
        index.spawn_build();
        Ok(index)
    }

    /// Re-creates a handle for a persisted index.
    ///
    /// With a usable checkpoint the graph is rebuilt from persisted entries
    /// and the index comes back ONLINE directly; the next sync resumes from
    /// the checkpointed position. Without one (or when the checkpoint was
    /// written under a different oracle dimension) the index is rebuilt
    /// from scratch as if freshly created.
    pub(crate) fn reopen(
        full_name: String,
        spec: IndexSpec,
        store: Arc<dyn SourceStore>,
        oracle: Arc<dyn EmbeddingOracle>,
        config: Config,
    ) -> Result<Arc<Self>> {
        let checkpoint = store.load_checkpoint(&full_name)?;
        let dimension = config.dimension();

        let usable = match checkpoint {
            Some(cp) if cp.dimension as usize == dimension => Some(cp),
            Some(cp) => {
                warn!(
                    index = %full_name,
                    stored = cp.dimension,
                    configured = dimension,
                    "Stored entries have a different dimension, rebuilding"
                );
                None
            }
            None => None,
        };

        let Some(checkpoint) = usable else {
            return Self::create(full_name, spec, store, oracle, config);
        };

        let entries = store.load_index_entries(&full_name)?;
        info!(index = %full_name, entries = entries.len(), "Rebuilding index from persisted entries");

        let hnsw_config = config.hnsw.clone();
        let index = Arc::new(Self::construct(
            full_name,
            spec,
            store,
            oracle,
            config,
            IndexState::Online,
            checkpoint.applied,
            move |dim| HnswIndex::rebuild_from_entries(dim, &hnsw_config, &entries),
        )?);
        index.spawn_continuous_worker_if_configured();
        Ok(index)
    }

    #[allow(clippy::too_many_arguments)]
    fn construct<F>(
        full_name: String,
        spec: IndexSpec,
        store: Arc<dyn SourceStore>,
        oracle: Arc<dyn EmbeddingOracle>,
        config: Config,
        state: IndexState,
        applied: SequencePosition,
        make_vector: F,
    ) -> Result<Self>
    where
        F: FnOnce(usize) -> Result<HnswIndex>,
    {
        let vector = make_vector(config.dimension())?;

        let mut texts = HashMap::new();
        if state.is_online() {
            for entry in store.load_index_entries(&full_name)? {
                texts.insert(entry.key, entry.text);
            }
        }

        Ok(Self {
            full_name,
            spec,
            store,
            oracle,
            config,
            vector,
            texts: RwLock::new(texts),
            lifecycle: RwLock::new(Lifecycle {
                state,
                failure: None,
                applied,
            }),
            sync_lock: Mutex::new(()),
            workers: Mutex::new(Workers::default()),
        })
    }

    // =========================================================================
    // Lifecycle observation
    // =========================================================================

    /// The fully qualified name of this index.
    pub fn name(&self) -> &str {
        &self.full_name
    }

    /// The declared spec of this index.
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Returns a point-in-time status snapshot.
    pub fn describe(&self) -> IndexStatus {
        let (state, failure, applied) = match self.lifecycle.read() {
            Ok(cell) => (cell.state, cell.failure.clone(), cell.applied),
            Err(_) => (
                IndexState::Failed,
                Some("lifecycle lock poisoned".to_string()),
                SequencePosition::START,
            ),
        };
        IndexStatus {
            name: self.full_name.clone(),
            state,
            entries: self.vector.len(),
            applied,
            failure,
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> IndexState {
        self.describe().state
    }

    /// The failure message, when the index is FAILED.
    pub fn failure_reason(&self) -> Option<String> {
        self.describe().failure
    }

    /// Number of live entries in the index.
    pub fn len(&self) -> usize {
        self.vector.len()
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    /// Live entry keys in ascending order. Intended for inspection and
    /// reconciliation checks.
    pub fn entry_keys(&self) -> Vec<RecordId> {
        let mut keys: Vec<RecordId> = match self.texts.read() {
            Ok(texts) => texts.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        keys.sort();
        keys
    }

    /// Blocks until the index reaches ONLINE, polling `describe()` on the
    /// policy's cadence.
    ///
    /// # Errors
    /// - `Upstream` if the index reaches FAILED (carries the build failure)
    /// - `Timeout` once the attempt bound is exhausted
    #[instrument(skip(self, policy), fields(index = %self.full_name))]
    pub fn wait_until_online(&self, policy: &PollPolicy) -> Result<()> {
        let started = Instant::now();
        for attempt in 1..=policy.max_attempts {
            let status = self.describe();
            match status.state {
                IndexState::Online => {
                    debug!(attempt, "Index is online");
                    return Ok(());
                }
                IndexState::Failed => {
                    let msg = status
                        .failure
                        .unwrap_or_else(|| "index failed with no recorded reason".to_string());
                    return Err(DeltaSearchError::index_failed(msg));
                }
                _ => {
                    trace!(attempt, state = %status.state, "Index not yet online");
                    if attempt < policy.max_attempts {
                        std::thread::sleep(policy.interval);
                    }
                }
            }
        }
        Err(DeltaSearchError::Timeout {
            attempts: policy.max_attempts,
            waited: started.elapsed(),
        })
    }

    // =========================================================================
    // Initial build
    // =========================================================================

    fn spawn_build(self: &Arc<Self>) {
        let index = Arc::clone(self);
        let handle = std::thread::spawn(move || {
            index.run_build();
        });
        if let Ok(mut workers) = self.workers.lock() {
            workers.build = Some(handle);
        }
    }

    fn run_build(self: &Arc<Self>) {
        // Hold the sync lock for the whole build so a concurrent sync()
        // reports a conflict instead of interleaving.
        let _guard = match self.sync_lock.lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.fail("sync lock poisoned before initial build");
                return;
            }
        };

        match self.build_from_scan() {
            Ok(count) => {
                self.set_state(IndexState::Online);
                info!(index = %self.full_name, entries = count, "Initial build complete, index online");
                self.spawn_continuous_worker_if_configured();
            }
            Err(err) => {
                error!(index = %self.full_name, error = %err, "Initial build failed");
                self.fail(err.to_string());
            }
        }
    }

    /// Scans the source table, embeds every row, and populates the index.
    ///
    /// The feed position is captured before the scan; rows mutated during
    /// the build surface again as change events at the first sync, so the
    /// race costs a redundant re-embed rather than a lost update.
    fn build_from_scan(&self) -> Result<usize> {
        let table = &self.spec.source_table;
        let position = self.store.current_position(table)?;
        self.store.clear_index(&self.full_name)?;

        let records = self.store.scan_records(table)?;
        info!(index = %self.full_name, records = records.len(), "Starting initial build");
        self.set_state(IndexState::Syncing);

        for chunk in records.chunks(SYNC_BATCH_SIZE) {
            let texts: Vec<&str> = chunk.iter().map(|r| r.text.as_str()).collect();
            let embeddings = self.oracle.embed_batch(&texts)?;

            for (record, embedding) in chunk.iter().zip(embeddings) {
                self.oracle.validate_embedding(&embedding)?;
                self.apply_upsert(record.key, &record.text, embedding)?;
            }
        }

        self.store.save_checkpoint(
            &self.full_name,
            &IndexCheckpoint {
                applied: position,
                dimension: self.oracle.dimension() as u32,
            },
        )?;
        self.set_applied(position);

        Ok(records.len())
    }

    // =========================================================================
    // Delta sync
    // =========================================================================

    /// Runs one sync cycle: drains the change feed from the applied
    /// position and returns the number of events applied.
    ///
    /// Replays are harmless: events apply as upsert/remove by key, so an
    /// at-least-once feed converges to the same index.
    ///
    /// # Errors
    /// - `Conflict` if another sync cycle (or the initial build) is running
    /// - `Upstream` if the index is FAILED, or the oracle/store fails
    #[instrument(skip(self), fields(index = %self.full_name))]
    pub fn sync(&self) -> Result<u64> {
        let Ok(_guard) = self.sync_lock.try_lock() else {
            return Err(DeltaSearchError::conflict(format!(
                "a sync cycle is already running for index '{}'",
                self.full_name
            )));
        };

        let status = self.describe();
        match status.state {
            IndexState::Online => {}
            IndexState::Failed => {
                let msg = status
                    .failure
                    .unwrap_or_else(|| "index failed with no recorded reason".to_string());
                return Err(DeltaSearchError::index_failed(msg));
            }
            state => {
                // Build finished releasing the lock but state not yet online
                return Err(DeltaSearchError::conflict(format!(
                    "index '{}' is still {}",
                    self.full_name, state
                )));
            }
        }

        let mut applied_events: u64 = 0;
        let mut position = status.applied;

        loop {
            let events =
                self.store
                    .read_changes(&self.spec.source_table, position, SYNC_BATCH_SIZE)?;
            if events.is_empty() {
                break;
            }

            for event in &events {
                self.apply_event(event)?;
            }

            position = events[events.len() - 1].seq;
            applied_events += events.len() as u64;

            self.store.save_checkpoint(
                &self.full_name,
                &IndexCheckpoint {
                    applied: position,
                    dimension: self.oracle.dimension() as u32,
                },
            )?;
            self.set_applied(position);
        }

        if applied_events > 0 {
            info!(events = applied_events, position = %position, "Sync cycle applied changes");
        } else {
            trace!("Sync cycle found no new changes");
        }
        Ok(applied_events)
    }

    fn apply_event(&self, event: &ChangeEvent) -> Result<()> {
        if event.is_delete() {
            return self.apply_remove(event.key);
        }

        // Insert/update carry the new text; fall back to the source row for
        // feeds that don't. A row already deleted again is skipped, its
        // delete event follows later in the feed.
        let text = match &event.text {
            Some(text) => text.clone(),
            None => match self.store.get_record(&self.spec.source_table, event.key)? {
                Some(record) => record.text,
                None => return Ok(()),
            },
        };

        let embedding = self.oracle.embed(&text)?;
        self.oracle.validate_embedding(&embedding)?;
        self.apply_upsert(event.key, &text, embedding)
    }

    fn apply_upsert(&self, key: RecordId, text: &str, embedding: Vec<f32>) -> Result<()> {
        self.vector.upsert(key, &embedding)?;
        self.texts
            .write()
            .map_err(|_| DeltaSearchError::index_failed("text map lock poisoned"))?
            .insert(key, text.to_string());
        self.store.save_index_entry(
            &self.full_name,
            &IndexEntry {
                key,
                embedding,
                text: text.to_string(),
            },
        )?;
        Ok(())
    }

    fn apply_remove(&self, key: RecordId) -> Result<()> {
        self.vector.remove(key)?;
        self.texts
            .write()
            .map_err(|_| DeltaSearchError::index_failed("text map lock poisoned"))?
            .remove(&key);
        self.store.delete_index_entry(&self.full_name, key)?;
        Ok(())
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Searches the index for the `k` most relevant records.
    ///
    /// Hybrid mode re-scores the ANN candidate pool with a fused vector +
    /// lexical score, so its results are always a re-ranking of vector
    /// candidates. Ties break by ascending primary key in both modes.
    ///
    /// # Errors
    /// - `InvalidArgument` if `k == 0`
    /// - `NotReady` unless the index is ONLINE
    #[instrument(skip(self, query), fields(index = %self.full_name, k, mode = ?mode))]
    pub fn search(&self, query: &str, k: usize, mode: SearchMode) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(DeltaSearchError::invalid_argument(
                "k must be greater than 0",
            ));
        }

        let state = self.state();
        if !state.is_online() {
            return Err(DeltaSearchError::not_ready(self.full_name.clone(), state));
        }

        let embedding = self.oracle.embed(query)?;
        self.oracle.validate_embedding(&embedding)?;

        let fetch = search::fetch_size(k);
        let ef = self.config.hnsw.ef_search.max(fetch);
        let neighbours = self.vector.search(&embedding, fetch, ef)?;

        let texts = self
            .texts
            .read()
            .map_err(|_| DeltaSearchError::index_failed("text map lock poisoned"))?;

        let alpha = self.config.hybrid_alpha;
        let query_tokens = match mode {
            SearchMode::Ann => None,
            SearchMode::Hybrid => Some(search::lexical::query_tokens(query)),
        };

        let hits: Vec<SearchResult> = neighbours
            .into_iter()
            .filter_map(|(key, distance)| {
                let text = texts.get(&key)?.clone();
                // DistCosine distance is 1 - cos; similarity back in [-1, 1]
                let similarity = 1.0 - distance;
                let score = match &query_tokens {
                    None => similarity,
                    Some(tokens) => {
                        let lexical = search::lexical::overlap_score(tokens, &text);
                        alpha * similarity + (1.0 - alpha) * lexical
                    }
                };
                Some(SearchResult { key, text, score })
            })
            .collect();

        Ok(search::rank(hits, k))
    }

    // =========================================================================
    // Continuous trigger
    // =========================================================================

    fn spawn_continuous_worker_if_configured(self: &Arc<Self>) {
        if !self.spec.trigger_mode.is_continuous() {
            return;
        }

        let Ok(mut workers) = self.workers.lock() else {
            return;
        };
        if workers.sync.is_some() {
            return;
        }

        let (tx, rx) = bounded::<()>(1);
        let index = Arc::clone(self);
        let interval = self.config.poll.interval;
        let handle = std::thread::spawn(move || {
            debug!(index = %index.full_name, ?interval, "Continuous sync worker started");
            loop {
                match rx.recv_timeout(interval) {
                    // Shutdown signal or channel dropped
                    Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        match index.sync() {
                            Ok(_) => {}
                            // Another cycle is running; next tick catches up
                            Err(err) if err.is_retryable() => {}
                            Err(err) => {
                                warn!(index = %index.full_name, error = %err, "Continuous sync cycle failed");
                            }
                        }
                    }
                }
            }
            debug!(index = %index.full_name, "Continuous sync worker stopped");
        });
        workers.sync = Some((tx, handle));
    }

    /// Stops background threads and waits for them to finish.
    ///
    /// Idempotent; called by `DeltaSearch::close` for every open index.
    pub(crate) fn shutdown(&self) {
        let (build, sync) = match self.workers.lock() {
            Ok(mut workers) => (workers.build.take(), workers.sync.take()),
            Err(_) => return,
        };

        // A worker thread can be the one dropping the last Arc; never join
        // the current thread.
        let current = std::thread::current().id();
        if let Some((tx, handle)) = sync {
            let _ = tx.send(());
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        if let Some(handle) = build {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }

    // =========================================================================
    // State cell helpers
    // =========================================================================

    fn set_state(&self, state: IndexState) {
        if let Ok(mut cell) = self.lifecycle.write() {
            cell.state = state;
        }
    }

    fn set_applied(&self, applied: SequencePosition) {
        if let Ok(mut cell) = self.lifecycle.write() {
            cell.applied = applied;
        }
    }

    fn fail(&self, message: impl Into<String>) {
        if let Ok(mut cell) = self.lifecycle.write() {
            cell.state = IndexState::Failed;
            cell.failure = Some(message.into());
        }
    }
}

impl std::fmt::Debug for DeltaSyncIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaSyncIndex")
            .field("name", &self.full_name)
            .field("state", &self.state())
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl Drop for DeltaSyncIndex {
    fn drop(&mut self) {
        self.shutdown();
    }
}
