//! Embedding oracle abstractions.
//!
//! An oracle turns text into fixed-dimension `f32` vectors. It is a black
//! box behind the [`EmbeddingOracle`] trait: the syncer and query engine
//! only rely on the declared dimension and on transient failures being
//! reported as retryable errors.
//!
//! Two implementations ship with the crate:
//!
//! - [`HashingOracle`] - deterministic token-hashed bag of words, no
//!   external dependencies. The default, and what the tests use.
//! - [`ExternalOracle`] - a named model endpoint. The embedded build has no
//!   transport for it; calls fail with an upstream error naming the
//!   endpoint. Wire a real client by implementing [`EmbeddingOracle`] and
//!   passing it to `DeltaSearch::open_with_oracle`.
//!
//! [`RetryingOracle`] wraps any oracle with bounded retry for transient
//! failures.

mod hashing;

pub use hashing::HashingOracle;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::{DeltaSearchError, Result, ValidationError};
use crate::types::Embedding;

/// Contract for producing embedding vectors from text.
///
/// Implementations must be `Send + Sync`; the sync worker and query path
/// share one oracle behind an `Arc`.
pub trait EmbeddingOracle: Send + Sync {
    /// Embeds a single text into a vector of exactly `dimension()` floats.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embeds a batch of texts, preserving order.
    ///
    /// The default implementation calls [`embed`](Self::embed) per text;
    /// endpoint-backed oracles should override this with a real batch call.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// The fixed output dimension of this oracle.
    fn dimension(&self) -> usize;

    /// Checks that an embedding matches this oracle's dimension.
    fn validate_embedding(&self, embedding: &Embedding) -> Result<()> {
        if embedding.len() != self.dimension() {
            return Err(ValidationError::dimension_mismatch(
                self.dimension(),
                embedding.len(),
            )
            .into());
        }
        Ok(())
    }
}

/// Oracle for a named external model endpoint.
///
/// This build carries no HTTP transport, so every call reports an upstream
/// failure naming the endpoint. It exists so a configuration that names an
/// endpoint fails loudly at first use rather than silently hashing.
#[derive(Debug, Clone)]
pub struct ExternalOracle {
    endpoint: String,
    dimension: usize,
}

impl ExternalOracle {
    /// Creates an oracle bound to a named endpoint.
    pub fn new(endpoint: impl Into<String>, dimension: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            dimension,
        }
    }

    /// The endpoint this oracle is bound to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl EmbeddingOracle for ExternalOracle {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(DeltaSearchError::oracle(format!(
            "no transport configured for embedding endpoint '{}'",
            self.endpoint
        )))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Bounded-retry wrapper around another oracle.
///
/// Retries transient upstream failures up to `max_retries` times with a
/// fixed backoff, then surfaces the last error. Invalid-input errors are
/// not retried.
pub struct RetryingOracle {
    inner: Arc<dyn EmbeddingOracle>,
    max_retries: u32,
    backoff: std::time::Duration,
}

impl RetryingOracle {
    /// Wraps an oracle with a retry bound and a fixed backoff between
    /// attempts.
    pub fn new(
        inner: Arc<dyn EmbeddingOracle>,
        max_retries: u32,
        backoff: std::time::Duration,
    ) -> Self {
        Self {
            inner,
            max_retries,
            backoff,
        }
    }

    fn retryable(err: &DeltaSearchError) -> bool {
        err.is_retryable() || matches!(err, DeltaSearchError::Upstream(_))
    }
}

impl EmbeddingOracle for RetryingOracle {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut attempt = 0;
        loop {
            match self.inner.embed(text) {
                Ok(embedding) => return Ok(embedding),
                Err(err) if Self::retryable(&err) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "Transient oracle failure, retrying");
                    std::thread::sleep(self.backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut attempt = 0;
        loop {
            match self.inner.embed_batch(texts) {
                Ok(embeddings) => return Ok(embeddings),
                Err(err) if Self::retryable(&err) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "Transient oracle failure, retrying batch");
                    std::thread::sleep(self.backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Builds the oracle described by an [`OracleConfig`].
pub fn create_oracle(config: &OracleConfig) -> Arc<dyn EmbeddingOracle> {
    match config {
        OracleConfig::Hashing { dimension } => {
            debug!(dimension, "Using hashing oracle");
            Arc::new(HashingOracle::new(*dimension))
        }
        OracleConfig::External {
            endpoint,
            dimension,
        } => {
            debug!(endpoint = %endpoint, dimension, "Using external oracle");
            Arc::new(ExternalOracle::new(endpoint.clone(), *dimension))
        }
    }
}
