//! # deltasearch
//!
//! An embedded, change-feed-synchronized vector search engine.
//!
//! deltasearch keeps an approximate-nearest-neighbor index in lockstep with
//! a mutable source table. Rows carry an integer primary key and a text
//! column; an embedding oracle turns the text into vectors; a delta-sync
//! index drains the table's change feed so inserts, updates, and deletes
//! all converge into the index without re-embedding the world.
//!
//! ## Features
//!
//! - **Embedded**: single store file, no server, pure Rust
//! - **Delta sync**: incremental, checkpointed, replay-safe change
//!   application
//! - **Lifecycle**: `PROVISIONING -> SYNCING -> ONLINE` with bounded
//!   readiness polling; failures are retained and inspectable
//! - **Idempotent setup**: endpoint and index creation absorb
//!   already-exists instead of failing
//! - **ANN and hybrid search**: HNSW cosine retrieval, optionally fused
//!   with lexical overlap; deterministic tie-breaking by primary key
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deltasearch::{Config, DeltaSearch, IndexSpec, Record, SearchMode, TableSpec, TriggerMode};
//!
//! fn main() -> deltasearch::Result<()> {
//!     let db = DeltaSearch::open("./delta.db", Config::default())?;
//!
//!     // A source table with change tracking
//!     db.create_table(
//!         &TableSpec::new("billing_faq_dataset", "index", "faq"),
//!         &[
//!             Record::new(1, "Q: How do I pay my bill? A: Online or by phone."),
//!             Record::new(2, "Q: Why is my bill higher this month? A: Check for one-time charges."),
//!         ],
//!     )?;
//!     db.enable_change_tracking("billing_faq_dataset")?;
//!
//!     // An index over the table, built in the background
//!     db.create_endpoint("shared-endpoint")?;
//!     let index = db.create_index(IndexSpec {
//!         name: "billing_faq_index".to_string(),
//!         endpoint: "shared-endpoint".to_string(),
//!         source_table: "billing_faq_dataset".to_string(),
//!         primary_key: "index".to_string(),
//!         embedding_source_column: "faq".to_string(),
//!         trigger_mode: TriggerMode::Triggered,
//!     })?;
//!     index.wait_until_online(&db.config().poll)?;
//!
//!     // Query, mutate, sync, query again
//!     let hits = index.search("How do I pay my bill?", 5, SearchMode::Ann)?;
//!     println!("top hit: {:?}", hits.first());
//!
//!     db.upsert_record("billing_faq_dataset", &Record::new(3, "Q: Can I get a refund? A: Within 30 days."))?;
//!     index.sync()?;
//!
//!     db.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   DeltaSearch                    │
//! │  (tables, endpoints, index registry, lifecycle)  │
//! └───────┬──────────────┬───────────────┬──────────┘
//!         │              │               │
//!    ┌────▼────┐   ┌─────▼──────┐   ┌────▼─────┐
//!    │  store  │   │ embedding  │   │  index   │
//!    │  (redb) │   │  (oracle)  │   │ (delta   │
//!    │         │   │            │   │  sync)   │
//!    └─────────┘   └────────────┘   └────┬─────┘
//!                                        │
//!                                   ┌────▼─────┐
//!                                   │  vector  │
//!                                   │  (HNSW)  │
//!                                   └──────────┘
//! ```
//!
//! The store is the source of truth: tables, the change feed, and the
//! persisted index entries all live in one redb file. The HNSW graph is
//! derived and rebuilt from persisted entries on open.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod feed;
pub mod index;
pub mod search;
pub mod store;
pub mod types;
pub mod vector;

// Re-export main public API at crate root
pub use config::{Config, HnswConfig, Namespace, OracleConfig, PollPolicy, TriggerMode};
pub use db::DeltaSearch;
pub use error::{DeltaSearchError, Result, StorageError, UpstreamError, ValidationError};
pub use feed::{ChangeEvent, ChangeOp};
pub use index::{DeltaSyncIndex, IndexSpec, IndexStatus};
pub use search::{SearchMode, SearchResult};
pub use store::TableSpec;
pub use types::{Embedding, IndexEntry, IndexState, Record, RecordId, SequencePosition, Timestamp};

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
