//! Eventide storage layer
//!
//! The in-memory columnar core:
//!
//! - **event**: the [`Event`] record ingested from producers
//! - **store**: the [`ColumnStore`] — table-partitioned, append-only
//!   sequences with time-bounded scans
//!
//! # Architecture
//!
//! ```text
//! Write path:
//!   Event batch → group by table → append under per-table mutex
//!
//! Read path:
//!   scan(table, from_ts, to_ts) → snapshot under mutex → filter → Rows
//! ```

pub mod event;
pub mod store;

pub use event::{Event, DEFAULT_TABLE};
pub use store::{ColumnStore, Row, StoreStats, TableBatch};
