//! # Eventide
//!
//! In-process event analytics: a columnar in-memory store fed by a
//! streaming ingest buffer, a restricted SQL dialect over it, and
//! secondary indexes chosen, built, and dropped by an adaptive control
//! loop driven by the recent query workload.
//!
//! ## Features
//!
//! - **Schemaless ingest**: events are a timestamp, table, user, name,
//!   and a free-form property bag
//! - **Columnar store**: per-table append-only sequences with
//!   time-bounded scans
//! - **SQL dialect**: filter, group, aggregate, order, limit — with
//!   time-range pushdown into the scan
//! - **Adaptive indexing**: bitmap and B-tree indexes built in the
//!   background from observed predicates, dropped when stale
//!
//! ## Modules
//!
//! - [`storage`]: events and the column store
//! - [`ingest`]: buffered ingestion with soft backpressure
//! - [`query`]: parser, planner, executor, and query service
//! - [`index`]: secondary indexes and the adaptive loop
//! - [`engine`]: the assembled facade
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use eventide::{Config, Engine, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(Config::default());
//!     engine.start();
//!
//!     engine.submit(vec![
//!         Event::new("u1", "click").prop("region", "us").prop("price", "10"),
//!         Event::new("u2", "purchase").prop("region", "eu").prop("price", "25"),
//!     ])?;
//!     engine.flush();
//!
//!     let result = engine.execute_sql(
//!         "SELECT region, COUNT(*) AS c FROM events GROUP BY region ORDER BY c DESC",
//!     )?;
//!     println!("{:?}", result.rows);
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod index;
pub mod ingest;
pub mod query;
pub mod storage;

// Re-export the top-level types
pub use config::{Config, ConfigError, IndexConfig, IngestConfig, LoggingConfig};
pub use engine::{Engine, EngineStats};
pub use index::{
    IndexCatalog, IndexLookupResult, IndexManager, IndexManagerStats, IndexQuery, RowSet,
    SecondaryIndex,
};
pub use ingest::{IngestError, IngestService, IngestStats};
pub use query::{
    PhysicalPlan, QueryError, QueryRequest, QueryResult, QueryService, Value,
};
pub use storage::{ColumnStore, Event, Row, StoreStats, DEFAULT_TABLE};
