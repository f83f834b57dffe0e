//! Vector index abstractions.
//!
//! The vector index is a derived, in-memory structure: persisted index
//! entries in the store are the source of truth, and the graph is rebuilt
//! from them on open. The trait seam keeps the syncer and query engine
//! independent of the ANN implementation; [`HnswIndex`] is the one that
//! ships.

pub mod hnsw;

pub use hnsw::HnswIndex;

use crate::error::Result;
use crate::types::RecordId;

/// In-memory approximate-nearest-neighbor index keyed by record primary key.
///
/// Implementations must be `Send + Sync`; the sync worker mutates the index
/// while the query path reads it.
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces the vector stored under a key.
    fn upsert(&self, key: RecordId, embedding: &[f32]) -> Result<()>;

    /// Removes a key from the index. Returns `false` if it wasn't present.
    fn remove(&self, key: RecordId) -> Result<bool>;

    /// Returns up to `k` nearest keys with their cosine distances, closest
    /// first; ties break by ascending key.
    fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(RecordId, f32)>>;

    /// Returns true if the key is currently indexed.
    fn contains(&self, key: RecordId) -> bool;

    /// Number of live (non-removed) keys.
    fn len(&self) -> usize;

    /// Returns true if no live keys are indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The embedding dimension this index was created with.
    fn dimension(&self) -> usize;
}
