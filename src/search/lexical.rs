//! Tokenization and lexical overlap scoring.

use std::collections::HashSet;

/// Splits text into lowercase alphanumeric tokens.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of query tokens that appear in the document.
///
/// Returns a score in `[0, 1]`. An empty query scores 0 against everything.
pub(crate) fn overlap_score(query_tokens: &HashSet<String>, doc: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let doc_tokens: HashSet<String> = tokenize(doc).into_iter().collect();
    let shared = query_tokens.intersection(&doc_tokens).count();
    shared as f32 / query_tokens.len() as f32
}

/// Tokenizes a query into the set form `overlap_score` consumes.
pub(crate) fn query_tokens(query: &str) -> HashSet<String> {
    tokenize(query).into_iter().collect()
}
