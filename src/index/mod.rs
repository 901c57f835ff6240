//! Eventide secondary indexing
//!
//! Adaptive secondary indexes over the column store:
//!
//! - **row_set**: dual-form sets of segment-local row positions
//! - **secondary**: the bitmap and B-tree index variants
//! - **catalog**: which `(table, column)` pairs are desired, plus usage
//! - **policy**: workload-driven build/drop recommendations
//! - **builder**: bounded background index construction
//! - **manager**: ownership, lookups, and the periodic adaptive tick
//!
//! # Lifecycle
//!
//! ```text
//! queries → record_query_usage → AdaptivePolicy window
//!                                      │ adaptive tick
//!                                      ▼
//!                         ensure_index / drop_index
//!                                      │
//! ingest flush → on_segment_flushed → BackgroundBuilder → install
//! ```

pub mod builder;
pub mod catalog;
pub mod manager;
pub mod policy;
pub mod row_set;
pub mod secondary;

pub use builder::{BackgroundBuilder, BuilderError, BuilderStats, BuiltIndex};
pub use catalog::{CatalogStats, IndexCatalog, IndexSpec};
pub use manager::{IndexLookupResult, IndexManager, IndexManagerStats, IndexQuery};
pub use policy::{AdaptivePolicy, PolicyStats};
pub use row_set::RowSet;
pub use secondary::{BTreeIndex, BitmapIndex, SecondaryIndex, SecondaryIndexStats};
