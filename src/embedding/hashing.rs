//! Deterministic token-hashing oracle.

use crate::error::Result;
use crate::search::lexical::tokenize;
use crate::types::Embedding;

use super::EmbeddingOracle;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a hash of a token.
fn fnv1a(token: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Token-hashed bag-of-words oracle.
///
/// Each token is FNV-1a-hashed into one of `dimension` buckets and the
/// resulting counts are L2-normalized. Deterministic, cheap, and good
/// enough to make near-verbatim text rank first under cosine distance,
/// which is what the demos and tests need. Not a semantic model.
#[derive(Debug, Clone)]
pub struct HashingOracle {
    dimension: usize,
}

impl HashingOracle {
    /// Creates a hashing oracle with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingOracle for HashingOracle {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let bucket = (fnv1a(&token) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
