//! Configuration types for deltasearch.
//!
//! The [`Config`] struct is the single, validated configuration surface:
//! namespace, oracle selection, trigger mode, readiness polling, HNSW tuning,
//! and the hybrid fusion weight. It is constructed once and passed to
//! [`DeltaSearch::open`](crate::DeltaSearch::open) — there is no process-wide
//! mutable configuration.
//!
//! # Example
//! ```rust
//! use deltasearch::{Config, OracleConfig, TriggerMode};
//!
//! // Use defaults (hashing oracle, 256 dimensions, triggered sync)
//! let config = Config::default();
//!
//! // Customize for an external embedding endpoint
//! let config = Config {
//!     oracle: OracleConfig::External {
//!         endpoint: "embedding-gte-large".to_string(),
//!         dimension: 1024,
//!     },
//!     trigger_mode: TriggerMode::Continuous,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest embedding dimension the store accepts.
const MAX_DIMENSION: usize = 4096;

/// Library configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use deltasearch::Config;
///
/// let config = Config {
///     hybrid_alpha: 0.7,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Catalog/schema namespace that index names are qualified under.
    pub namespace: Namespace,

    /// How query and record embeddings are produced.
    pub oracle: OracleConfig,

    /// How index sync cycles are triggered.
    pub trigger_mode: TriggerMode,

    /// Readiness polling policy for `wait_until_online`, and the cadence of
    /// the continuous sync worker.
    pub poll: PollPolicy,

    /// HNSW graph tuning parameters.
    pub hnsw: HnswConfig,

    /// Weight of vector similarity in hybrid fusion, in `[0, 1]`.
    ///
    /// `score = hybrid_alpha * vector_similarity + (1 - hybrid_alpha) * lexical_overlap`
    pub hybrid_alpha: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: Namespace::default(),
            // Hashing is the safe default - deterministic, no external endpoint
            oracle: OracleConfig::default(),
            trigger_mode: TriggerMode::default(),
            poll: PollPolicy::default(),
            hnsw: HnswConfig::default(),
            hybrid_alpha: 0.5,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `DeltaSearch::open()`. You can also call this
    /// explicitly to check configuration before attempting to open.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - the oracle dimension is 0 or exceeds 4096
    /// - `hybrid_alpha` is outside `[0, 1]`
    /// - the poll policy has zero attempts
    /// - the HNSW capacity is 0
    pub fn validate(&self) -> Result<(), ValidationError> {
        let dim = self.oracle.dimension();
        if dim == 0 {
            return Err(ValidationError::invalid_field(
                "oracle.dimension",
                "must be greater than 0",
            ));
        }
        if dim > MAX_DIMENSION {
            return Err(ValidationError::invalid_field(
                "oracle.dimension",
                format!("must not exceed {}", MAX_DIMENSION),
            ));
        }

        if !(0.0..=1.0).contains(&self.hybrid_alpha) {
            return Err(ValidationError::invalid_field(
                "hybrid_alpha",
                "must be within [0, 1]",
            ));
        }

        if self.poll.max_attempts == 0 {
            return Err(ValidationError::invalid_field(
                "poll.max_attempts",
                "must be greater than 0",
            ));
        }

        if self.hnsw.max_elements == 0 {
            return Err(ValidationError::invalid_field(
                "hnsw.max_elements",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Returns the embedding dimension fixed by the oracle contract.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.oracle.dimension()
    }
}

/// Catalog/schema namespace.
///
/// Index and table names are qualified as `catalog.schema.name` the way a
/// warehouse-style three-level namespace does it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Top-level catalog.
    pub catalog: String,
    /// Schema within the catalog.
    pub schema: String,
}

impl Default for Namespace {
    fn default() -> Self {
        Self {
            catalog: "main".to_string(),
            schema: "default".to_string(),
        }
    }
}

impl Namespace {
    /// Creates a namespace from catalog and schema names.
    pub fn new(catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
        }
    }

    /// Returns the fully qualified name `catalog.schema.name`.
    pub fn qualify(&self, name: &str) -> String {
        format!("{}.{}.{}", self.catalog, self.schema, name)
    }
}

/// Embedding oracle selection.
///
/// Determines how embedding vectors are produced for records and queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleConfig {
    /// Deterministic local hashing oracle (token-hashed bag of words).
    ///
    /// Self-contained and reproducible; the default for demos and tests.
    Hashing {
        /// Output vector dimension.
        dimension: usize,
    },

    /// A named external model endpoint produces the embeddings.
    ///
    /// The embedded build cannot reach the endpoint itself; wire a real
    /// client through [`EmbeddingOracle`](crate::embedding::EmbeddingOracle)
    /// and `DeltaSearch::open_with_oracle` instead.
    External {
        /// Name of the embedding model endpoint.
        endpoint: String,
        /// Dimension the endpoint's model produces.
        dimension: usize,
    },
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self::Hashing { dimension: 256 }
    }
}

impl OracleConfig {
    /// Returns the embedding dimension of the configured oracle.
    #[inline]
    pub fn dimension(&self) -> usize {
        match self {
            Self::Hashing { dimension } => *dimension,
            Self::External { dimension, .. } => *dimension,
        }
    }

    /// Returns true if this is the deterministic hashing oracle.
    pub fn is_hashing(&self) -> bool {
        matches!(self, Self::Hashing { .. })
    }
}

/// How sync cycles are triggered for an index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    /// The caller invokes `sync()` explicitly.
    #[default]
    Triggered,

    /// A background worker drains the change feed on the poll cadence.
    Continuous,
}

impl TriggerMode {
    /// Returns true if a background sync worker should run.
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous)
    }
}

/// Bounded readiness polling policy.
///
/// The reference behavior polls every 5 seconds; the bound on attempts is
/// what keeps `wait_until_online` from becoming a hung process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between `describe()` calls.
    pub interval: Duration,
    /// Maximum number of polls before giving up with a Timeout.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    /// Creates a poll policy from an interval and attempt bound.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// HNSW graph tuning parameters.
///
/// Defaults are sized for small-to-medium corpora; raise `max_elements`
/// before indexing larger datasets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Maximum connections per node per layer.
    pub max_nb_connection: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Candidate list size during search (floor; raised to the fetch size).
    pub ef_search: usize,
    /// Maximum number of layers.
    pub max_layer: usize,
    /// Capacity hint for the graph.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 50,
            max_layer: 16,
            max_elements: 100_000,
        }
    }
}
