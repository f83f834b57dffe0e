//! Change feed types.
//!
//! When change tracking is enabled on a table, every row mutation appends a
//! [`ChangeEvent`] to the table's feed at a strictly increasing
//! [`SequencePosition`]. The syncer consumes events after its checkpoint, in
//! position order, so a delete is never undone by a stale earlier event.
//! Delivery is at-least-once; upsert-by-key on the index side makes replays
//! harmless.

use serde::{Deserialize, Serialize};

use crate::types::{RecordId, SequencePosition};

/// Kind of row mutation recorded in the change feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOp {
    /// A new row was written.
    Insert,
    /// An existing row's text changed.
    Update,
    /// A row was removed.
    Delete,
}

/// One row-level mutation in a table's change feed.
///
/// Insert and Update events carry the new text so the syncer can re-embed
/// without a second read of the source row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Position of this event in the table's feed.
    pub seq: SequencePosition,
    /// Primary key of the mutated row.
    pub key: RecordId,
    /// What happened to the row.
    pub op: ChangeOp,
    /// New text for Insert/Update; `None` for Delete.
    pub text: Option<String>,
}

impl ChangeEvent {
    /// Creates an insert event.
    pub fn insert(seq: SequencePosition, key: RecordId, text: impl Into<String>) -> Self {
        Self {
            seq,
            key,
            op: ChangeOp::Insert,
            text: Some(text.into()),
        }
    }

    /// Creates an update event.
    pub fn update(seq: SequencePosition, key: RecordId, text: impl Into<String>) -> Self {
        Self {
            seq,
            key,
            op: ChangeOp::Update,
            text: Some(text.into()),
        }
    }

    /// Creates a delete event.
    pub fn delete(seq: SequencePosition, key: RecordId) -> Self {
        Self {
            seq,
            key,
            op: ChangeOp::Delete,
            text: None,
        }
    }

    /// Returns true if this event removes the row.
    #[inline]
    pub fn is_delete(&self) -> bool {
        matches!(self.op, ChangeOp::Delete)
    }
}
