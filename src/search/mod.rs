//! Query engine types and result ranking.
//!
//! Search runs against an online index in one of two modes:
//!
//! - [`SearchMode::Ann`] ranks purely by vector similarity.
//! - [`SearchMode::Hybrid`] re-scores the ANN candidate pool with a fused
//!   vector + lexical score, so hybrid results are always drawn from the
//!   vector candidates.
//!
//! Ranking is total: ties on score break by ascending primary key, which
//! keeps result order deterministic across runs.

pub(crate) mod lexical;

use serde::{Deserialize, Serialize};

use crate::types::RecordId;

/// Retrieval mode for a search request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Pure approximate-nearest-neighbor ranking by vector similarity.
    #[default]
    Ann,

    /// Vector similarity fused with lexical overlap against the query text.
    Hybrid,
}

/// One ranked search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Primary key of the matching record.
    pub key: RecordId,
    /// The indexed text of the record.
    pub text: String,
    /// Relevance score; higher is more relevant.
    pub score: f32,
}

/// Number of ANN candidates to fetch when `k` results are requested.
///
/// Hybrid re-scoring needs slack beyond `k` so lexical evidence can promote
/// a candidate that vector similarity alone ranked just below the cut.
pub(crate) fn fetch_size(k: usize) -> usize {
    (4 * k).max(k + 16)
}

/// Sorts hits by descending score, ties broken by ascending primary key,
/// and truncates to `k`.
pub(crate) fn rank(mut hits: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(key: i64, score: f32) -> SearchResult {
        SearchResult {
            key: RecordId::new(key),
            text: String::new(),
            score,
        }
    }

    #[test]
    fn test_rank_orders_by_score_desc() {
        let ranked = rank(vec![hit(1, 0.2), hit(2, 0.9), hit(3, 0.5)], 3);
        let keys: Vec<i64> = ranked.iter().map(|r| r.key.as_i64()).collect();
        assert_eq!(keys, vec![2, 3, 1]);
    }

    #[test]
    fn test_rank_breaks_ties_by_ascending_key() {
        let ranked = rank(vec![hit(7, 0.5), hit(2, 0.5), hit(5, 0.5)], 3);
        let keys: Vec<i64> = ranked.iter().map(|r| r.key.as_i64()).collect();
        assert_eq!(keys, vec![2, 5, 7]);
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let ranked = rank(vec![hit(1, 0.1), hit(2, 0.2), hit(3, 0.3)], 2);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_fetch_size_has_slack() {
        assert!(fetch_size(1) >= 17);
        assert_eq!(fetch_size(5), 21);
        assert_eq!(fetch_size(100), 400);
    }
}
