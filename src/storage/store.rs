//! In-memory columnar event store
//!
//! The [`ColumnStore`] is the authoritative record of all ingested events,
//! partitioned by logical table. Each table is an append-only sequence
//! guarded by its own mutex; scans take a snapshot under the mutex and
//! iterate without holding it, so readers and appenders never block one
//! another for long.

use crate::storage::event::{Event, DEFAULT_TABLE};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A read-only view over a stored event
///
/// Cheap to clone: it is a reference-counted handle to the event, not a
/// copy. Base columns are exposed as typed accessors; properties are
/// reachable by name.
#[derive(Debug, Clone)]
pub struct Row {
    event: Arc<Event>,
}

impl Row {
    pub fn new(event: Arc<Event>) -> Self {
        Self { event }
    }

    pub fn ts(&self) -> i64 {
        self.event.ts
    }

    pub fn table(&self) -> &str {
        &self.event.table
    }

    pub fn user_id(&self) -> Option<&str> {
        self.event.user_id.as_deref()
    }

    pub fn event_name(&self) -> &str {
        &self.event.event
    }

    pub fn props(&self) -> &HashMap<String, String> {
        &self.event.props
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.event.property(key)
    }

    /// The underlying event
    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }
}

/// Events appended to one table by a single `append_batch` call
///
/// Returned to the ingest path so it can register the batch as a segment
/// and hand the rows to the index builder without regrouping.
#[derive(Debug)]
pub struct TableBatch {
    pub table: String,
    pub rows: Vec<Row>,
}

/// Storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_events: u64,
    pub total_batches: u64,
    pub table_count: usize,
    pub table_sizes: HashMap<String, usize>,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Events: {}, Batches: {}, Tables: {}",
            self.total_events, self.total_batches, self.table_count
        )
    }
}

/// In-memory columnar store: table name → append-only event sequence
pub struct ColumnStore {
    tables: RwLock<HashMap<String, Arc<Mutex<Vec<Arc<Event>>>>>>,
    total_events: AtomicU64,
    total_batches: AtomicU64,
}

impl Default for ColumnStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            total_events: AtomicU64::new(0),
            total_batches: AtomicU64::new(0),
        }
    }

    /// Append a batch of events, grouping them by table
    ///
    /// Events without a table land in [`DEFAULT_TABLE`]. Within one call the
    /// appended events are contiguous and in input order; a concurrent
    /// reader of a table sees either all or none of the batch's effects on
    /// that table. Returns the per-table row views that were appended.
    pub fn append_batch(&self, events: Vec<Event>) -> Vec<TableBatch> {
        if events.is_empty() {
            return Vec::new();
        }

        let count = events.len() as u64;

        // Group by table, substituting the default where absent
        let mut by_table: HashMap<String, Vec<Arc<Event>>> = HashMap::new();
        for mut event in events {
            if event.table.trim().is_empty() {
                event.table = DEFAULT_TABLE.to_string();
            }
            let table = event.table.clone();
            by_table.entry(table).or_default().push(Arc::new(event));
        }

        let mut batches = Vec::with_capacity(by_table.len());
        for (table, table_events) in by_table {
            let list = self.table_entry(&table);
            let rows: Vec<Row> = table_events.iter().cloned().map(Row::new).collect();
            list.lock().extend(table_events);
            batches.push(TableBatch { table, rows });
        }

        self.total_events.fetch_add(count, Ordering::Relaxed);
        self.total_batches.fetch_add(1, Ordering::Relaxed);
        batches
    }

    fn table_entry(&self, table: &str) -> Arc<Mutex<Vec<Arc<Event>>>> {
        if let Some(list) = self.tables.read().get(table) {
            return Arc::clone(list);
        }
        let mut tables = self.tables.write();
        Arc::clone(
            tables
                .entry(table.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Vec::new()))),
        )
    }

    /// Scan a table for rows with `from_ts <= ts <= to_ts` that pass the
    /// optional filter, in insertion order
    ///
    /// Unknown tables yield an empty result, never an error.
    pub fn scan(
        &self,
        table: &str,
        from_ts: i64,
        to_ts: i64,
        filter: Option<&dyn Fn(&Row) -> bool>,
    ) -> Vec<Row> {
        let list = match self.tables.read().get(table) {
            Some(list) => Arc::clone(list),
            None => return Vec::new(),
        };

        // Snapshot the Arc handles under the lock, filter outside it
        let snapshot: Vec<Arc<Event>> = list.lock().clone();

        snapshot
            .into_iter()
            .filter(|event| event.ts >= from_ts && event.ts <= to_ts)
            .map(Row::new)
            .filter(|row| filter.map_or(true, |f| f(row)))
            .collect()
    }

    /// Total number of events across all tables
    pub fn size(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    /// Names of all tables that have received at least one event
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Storage statistics with per-table counts
    pub fn stats(&self) -> StoreStats {
        let tables = self.tables.read();
        let table_sizes: HashMap<String, usize> = tables
            .iter()
            .map(|(name, list)| (name.clone(), list.lock().len()))
            .collect();

        StoreStats {
            total_events: self.total_events.load(Ordering::Relaxed),
            total_batches: self.total_batches.load(Ordering::Relaxed),
            table_count: table_sizes.len(),
            table_sizes,
        }
    }

    /// Drop all data and reset counters
    pub fn clear(&self) {
        self.tables.write().clear();
        self.total_events.store(0, Ordering::Relaxed);
        self.total_batches.store(0, Ordering::Relaxed);
    }
}
