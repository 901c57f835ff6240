//! Eventide ingest layer
//!
//! Producers hand event batches to the [`IngestService`]; it stages them
//! in memory, applies soft backpressure, and flushes batches into the
//! [`ColumnStore`](crate::storage::ColumnStore) — each flush becoming a
//! segment the index subsystem can build over.

pub mod service;

pub use service::{IngestError, IngestService, IngestStats};
