//! Core type definitions for deltasearch identifiers, positions, and state.
//!
//! Records are keyed by caller-assigned integer primary keys, and the change
//! feed is ordered by a strictly increasing sequence position assigned by the
//! source store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of a source record.
///
/// Keys are assigned by the caller, must be unique within a table, and are
/// immutable once assigned.
///
/// # Example
/// ```
/// use deltasearch::RecordId;
///
/// let key = RecordId::new(10);
/// assert_eq!(key.as_i64(), 10);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Creates a RecordId from a raw integer key.
    #[inline]
    pub const fn new(key: i64) -> Self {
        Self(key)
    }

    /// Returns the raw integer key.
    #[inline]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(key: i64) -> Self {
        Self(key)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in a table's change feed.
///
/// Positions are assigned by the store when change tracking is enabled and
/// are strictly increasing per table. The syncer applies events in position
/// order and checkpoints the last applied position.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SequencePosition(pub u64);

impl SequencePosition {
    /// Position before any event (the feed start).
    pub const START: Self = Self(0);

    /// Creates a position from a raw sequence number.
    #[inline]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence number.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the next position after this one.
    #[inline]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequencePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in milliseconds.
///
/// Using i64 allows representing dates far into the future and past.
/// Millisecond precision is sufficient for sync bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch (should never happen
    /// in practice), returns a timestamp of 0 (epoch) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a delta-sync index.
///
/// ```text
/// Provisioning ──▶ Syncing ──▶ Online
///        │            │
///        └────────────┴──▶ Failed
/// ```
///
/// `Provisioning` and `Syncing` cover the initial embed-and-load only.
/// Incremental sync cycles run while the index stays `Online`, so readers
/// are never turned away by a routine delta sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// Index registered, resources being set up.
    Provisioning,
    /// Initial full embed-and-load in progress.
    Syncing,
    /// Index is serving queries.
    Online,
    /// Initial build failed; see the retained failure reason. A failed
    /// incremental sync instead surfaces its error to the caller and
    /// leaves the index `Online` for retry.
    Failed,
}

impl IndexState {
    /// Returns true if the index is serving queries.
    #[inline]
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }

    /// Returns true if the index failed; reopening the store rebuilds it.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns the state as an uppercase string (wire-style).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Syncing => "SYNCING",
            Self::Online => "ONLINE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in a source table: a stable primary key plus the text column
/// designated for embedding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique, immutable primary key.
    pub key: RecordId,
    /// Text content that gets embedded.
    pub text: String,
}

impl Record {
    /// Creates a record from a key and text.
    pub fn new(key: impl Into<RecordId>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// One entry of a delta-sync index: the record key, its embedding, and the
/// source text the embedding was produced from.
///
/// Invariant: after a completed sync, every entry's key corresponds to a
/// live record in the source table, and all embeddings share the oracle's
/// fixed dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Primary key of the source record.
    pub key: RecordId,
    /// Embedding vector produced by the oracle.
    pub embedding: Vec<f32>,
    /// Source text the embedding was produced from.
    pub text: String,
}

/// Embedding vector type alias.
///
/// Embeddings are f32 vectors of a fixed dimension set by the oracle.
pub type Embedding = Vec<f32>;
