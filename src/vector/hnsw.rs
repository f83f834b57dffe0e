//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw<f32, DistCosine>` with:
//! - Bidirectional `RecordId` ↔ `usize` ID mapping
//! - Upsert-by-key (re-embedding a record retires its old vector)
//! - Soft-delete via `HashSet` + filtered search
//!
//! HNSW graphs do not support true removal, so deletes and replaced
//! vectors stay in the graph and are excluded from results by a filtered
//! search. The graph is rebuilt from persisted index entries on open,
//! which also compacts away the dead vectors.
//!
//! # Thread Safety
//!
//! The `hnsw_rs::Hnsw` graph uses `parking_lot::RwLock` internally,
//! so `insert()` takes `&self`. Our mapping state is protected by
//! `std::sync::RwLock`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anndists::dist::DistCosine;
use hnsw_rs::prelude::*;

use crate::config::HnswConfig;
use crate::error::{DeltaSearchError, Result, ValidationError};
use crate::types::{IndexEntry, RecordId};

use super::VectorIndex;

/// HNSW index backed by `hnsw_rs`.
///
/// Each delta-sync index owns one `HnswIndex` instance, giving complete
/// isolation between indexes.
pub struct HnswIndex {
    /// The underlying HNSW graph. Uses `'static` lifetime because
    /// all data is heap-owned (not memory-mapped).
    hnsw: Hnsw<'static, f32, DistCosine>,

    /// Mutable mapping state protected by RwLock.
    state: RwLock<MappingState>,

    /// Embedding dimension (must match all inserted vectors).
    dimension: usize,
}

/// Internal mutable state for ID mapping and soft-deletion.
#[derive(Debug)]
struct MappingState {
    /// Forward map: RecordId → current internal usize ID.
    key_to_internal: HashMap<RecordId, usize>,

    /// Reverse map: internal usize ID → RecordId.
    /// Uses Vec for O(1) lookup by index.
    internal_to_key: Vec<RecordId>,

    /// Soft-deleted internal IDs (deleted keys and retired versions of
    /// upserted keys), excluded from search.
    dead: HashSet<usize>,

    /// Next internal ID to assign (monotonically increasing).
    next_id: usize,
}

impl MappingState {
    fn assign(&mut self, key: RecordId) -> usize {
        let internal = self.next_id;
        self.next_id += 1;
        self.key_to_internal.insert(key, internal);
        self.internal_to_key.push(key);
        internal
    }
}

impl HnswIndex {
    /// Creates a new empty HNSW index.
    pub fn new(dimension: usize, config: &HnswConfig) -> Self {
        let hnsw = Hnsw::new(
            config.max_nb_connection,
            config.max_elements,
            config.max_layer,
            config.ef_construction,
            DistCosine,
        );

        Self {
            hnsw,
            state: RwLock::new(MappingState {
                key_to_internal: HashMap::new(),
                internal_to_key: Vec::new(),
                dead: HashSet::new(),
                next_id: 0,
            }),
            dimension,
        }
    }

    /// Rebuilds an index from persisted entries.
    ///
    /// Used on open to reconstruct the graph from the store (the source of
    /// truth). Dead vectors from the previous session are not carried over.
    pub fn rebuild_from_entries(
        dimension: usize,
        config: &HnswConfig,
        entries: &[IndexEntry],
    ) -> Result<Self> {
        let index = Self::new(dimension, config);

        if entries.is_empty() {
            return Ok(index);
        }

        let mut state = index
            .state
            .write()
            .map_err(|_| DeltaSearchError::index_failed("vector index lock poisoned"))?;

        let mut batch: Vec<(&Vec<f32>, usize)> = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.embedding.len() != dimension {
                return Err(ValidationError::dimension_mismatch(
                    dimension,
                    entry.embedding.len(),
                )
                .into());
            }
            let internal = state.assign(entry.key);
            batch.push((&entry.embedding, internal));
        }

        drop(state);

        // Parallel bulk insert (uses rayon internally)
        index.hnsw.parallel_insert(&batch);

        Ok(index)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(ValidationError::dimension_mismatch(self.dimension, vector.len()).into());
        }
        Ok(())
    }
}

impl VectorIndex for HnswIndex {
    fn upsert(&self, key: RecordId, embedding: &[f32]) -> Result<()> {
        self.check_dimension(embedding)?;

        let mut state = self
            .state
            .write()
            .map_err(|_| DeltaSearchError::index_failed("vector index lock poisoned"))?;

        // Retire the previous vector for this key, if any
        if let Some(&old) = state.key_to_internal.get(&key) {
            state.dead.insert(old);
        }
        let internal = state.assign(key);

        // Drop the lock before calling hnsw insert (which acquires its own lock)
        drop(state);

        self.hnsw.insert((embedding, internal));
        Ok(())
    }

    fn remove(&self, key: RecordId) -> Result<bool> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DeltaSearchError::index_failed("vector index lock poisoned"))?;

        match state.key_to_internal.remove(&key) {
            Some(internal) => {
                state.dead.insert(internal);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(RecordId, f32)>> {
        self.check_dimension(query)?;

        let state = self
            .state
            .read()
            .map_err(|_| DeltaSearchError::index_failed("vector index lock poisoned"))?;

        if state.key_to_internal.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        // Filtered search excludes dead vectors. The concrete closure
        // auto-implements hnsw_rs::FilterT via the blanket impl.
        let dead_ref = &state.dead;
        let filter_fn = |id: &usize| -> bool { !dead_ref.contains(id) };
        let neighbours = if state.dead.is_empty() {
            self.hnsw.search(query, k, ef_search.max(k))
        } else {
            self.hnsw
                .search_filter(query, k, ef_search.max(k), Some(&filter_fn))
        };

        let mut hits: Vec<(RecordId, f32)> = neighbours
            .into_iter()
            .filter_map(|n| state.internal_to_key.get(n.d_id).map(|&key| (key, n.distance)))
            .collect();

        // hnsw_rs returns distance order; re-sort to pin tie order by key
        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        Ok(hits)
    }

    fn contains(&self, key: RecordId) -> bool {
        self.state
            .read()
            .ok()
            .is_some_and(|s| s.key_to_internal.contains_key(&key))
    }

    fn len(&self) -> usize {
        self.state.read().ok().map_or(0, |s| s.key_to_internal.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HnswConfig {
        HnswConfig {
            max_nb_connection: 16,
            ef_construction: 100,
            ef_search: 50,
            max_layer: 8,
            max_elements: 1000,
        }
    }

    /// Generates a deterministic embedding from a seed.
    /// Vectors with close seeds produce similar embeddings.
    fn make_embedding(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin())
            .collect()
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = HnswIndex::new(8, &test_config());
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_upsert_and_search() {
        let dim = 8;
        let index = HnswIndex::new(dim, &test_config());

        for i in 0..10i64 {
            index
                .upsert(RecordId::new(i), &make_embedding(i as u64, dim))
                .unwrap();
        }
        assert_eq!(index.len(), 10);

        let results = index.search(&make_embedding(5, dim), 3, 50).unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        for w in results.windows(2) {
            assert!(w[0].1 <= w[1].1, "Results not sorted by distance");
        }
        assert_eq!(results[0].0, RecordId::new(5));
    }

    #[test]
    fn test_upsert_replaces_vector() {
        let dim = 8;
        let index = HnswIndex::new(dim, &test_config());

        index
            .upsert(RecordId::new(1), &make_embedding(1, dim))
            .unwrap();
        index
            .upsert(RecordId::new(2), &make_embedding(100, dim))
            .unwrap();
        // Move key 1 to where key 2's neighborhood is
        index
            .upsert(RecordId::new(1), &make_embedding(100, dim))
            .unwrap();

        assert_eq!(index.len(), 2);

        let results = index.search(&make_embedding(1, dim), 2, 50).unwrap();
        // Key 1 should now rank by its new vector, not its old one
        let top = &results[0];
        assert!(top.1 > 0.0 || top.0 != RecordId::new(1) || results.len() == 2);

        let results = index.search(&make_embedding(100, dim), 1, 50).unwrap();
        assert_eq!(results[0].0, RecordId::new(1));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = HnswIndex::new(384, &test_config());
        let wrong = vec![1.0f32; 128];
        assert!(index.upsert(RecordId::new(1), &wrong).is_err());
        assert!(index.search(&wrong, 5, 50).is_err());
    }

    #[test]
    fn test_remove_excludes_from_search() {
        let dim = 8;
        let index = HnswIndex::new(dim, &test_config());

        for i in 0..5i64 {
            index
                .upsert(RecordId::new(i), &make_embedding(i as u64, dim))
                .unwrap();
        }

        assert!(index.remove(RecordId::new(0)).unwrap());
        assert!(!index.remove(RecordId::new(0)).unwrap());
        assert_eq!(index.len(), 4);
        assert!(!index.contains(RecordId::new(0)));
        assert!(index.contains(RecordId::new(1)));

        let results = index.search(&make_embedding(0, dim), 10, 50).unwrap();
        assert!(results.iter().all(|(key, _)| *key != RecordId::new(0)));
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let dim = 4;
        let index = HnswIndex::new(dim, &test_config());
        index
            .upsert(RecordId::new(1), &make_embedding(1, dim))
            .unwrap();

        let results = index.search(&make_embedding(1, dim), 100, 50).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_search_empty_index() {
        let dim = 4;
        let index = HnswIndex::new(dim, &test_config());
        let results = index.search(&make_embedding(1, dim), 10, 50).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_rebuild_from_entries() {
        let dim = 8;
        let entries: Vec<IndexEntry> = (0..20i64)
            .map(|i| IndexEntry {
                key: RecordId::new(i),
                embedding: make_embedding(i as u64, dim),
                text: format!("entry {}", i),
            })
            .collect();

        let index = HnswIndex::rebuild_from_entries(dim, &test_config(), &entries).unwrap();
        assert_eq!(index.len(), 20);

        let results = index.search(&make_embedding(10, dim), 5, 50).unwrap();
        assert_eq!(results[0].0, RecordId::new(10));
    }

    #[test]
    fn test_rebuild_empty() {
        let index = HnswIndex::rebuild_from_entries(384, &test_config(), &[]).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_identical_vector_near_zero_distance() {
        let dim = 8;
        let index = HnswIndex::new(dim, &test_config());
        let embedding = make_embedding(42, dim);
        index.upsert(RecordId::new(7), &embedding).unwrap();

        let results = index.search(&embedding, 1, 50).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, RecordId::new(7));
        assert!(
            results[0].1 < 0.001,
            "Expected near-zero distance for identical vectors, got {}",
            results[0].1
        );
    }
}
