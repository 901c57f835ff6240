//! Index manager
//!
//! Owns every secondary index, the segment registry, the catalog, the
//! adaptive policy, and the background builder. Lookups union per-segment
//! results under a read lock; installs, drops, and segment removal take
//! the write lock. A periodic adaptive tick turns observed query patterns
//! into build and drop actions.
//!
//! ```text
//! flush → on_segment_flushed → background build → install (write lock)
//! query → record_query_usage → policy window → adaptive tick
//!       → ensure_index / drop_index
//! ```

use crate::config::IndexConfig;
use crate::index::builder::{BackgroundBuilder, BuilderStats};
use crate::index::catalog::{CatalogStats, IndexCatalog};
use crate::index::policy::{AdaptivePolicy, PolicyStats};
use crate::index::row_set::RowSet;
use crate::index::secondary::{SecondaryIndex, SecondaryIndexStats};
use crate::storage::Row;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// segment_id → index, per column, per table
type TableIndexes = HashMap<String, HashMap<String, HashMap<String, SecondaryIndex>>>;

/// A query dispatched to per-segment indexes
#[derive(Debug, Clone)]
pub enum IndexQuery {
    Equals(String),
    In(Vec<String>),
    Range {
        lo: Option<f64>,
        include_lo: bool,
        hi: Option<f64>,
        include_hi: bool,
    },
}

impl IndexQuery {
    pub fn equals(value: impl Into<String>) -> Self {
        Self::Equals(value.into())
    }

    pub fn in_list(values: Vec<String>) -> Self {
        Self::In(values)
    }

    pub fn range(lo: Option<f64>, include_lo: bool, hi: Option<f64>, include_hi: bool) -> Self {
        Self::Range {
            lo,
            include_lo,
            hi,
            include_hi,
        }
    }
}

/// Result of a lookup across all segments of a `(table, column)`
#[derive(Debug, Default)]
pub struct IndexLookupResult {
    /// segment_id → matching row positions
    pub matches: HashMap<String, RowSet>,
    /// Whether the result is precise (no residual filtering required)
    pub exact: bool,
    /// Diagnostic: total positions produced across segments
    pub rows_considered: u64,
}

impl IndexLookupResult {
    fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct SegmentInfo {
    row_count: usize,
    #[allow(dead_code)]
    created_at: i64,
}

/// Aggregate index statistics
#[derive(Debug, Clone, Serialize)]
pub struct IndexManagerStats {
    pub total_indexes: usize,
    pub total_segments: usize,
    pub memory_bytes: u64,
    pub memory_budget_mb: u64,
    pub builder: BuilderStats,
    pub catalog: CatalogStats,
    pub policy: PolicyStats,
}

/// Owns indexes, segments, catalog, policy, and builder
pub struct IndexManager {
    config: IndexConfig,
    catalog: Arc<IndexCatalog>,
    policy: AdaptivePolicy,
    builder: BackgroundBuilder,
    indexes: Arc<RwLock<TableIndexes>>,
    segments: RwLock<HashMap<String, HashMap<String, SegmentInfo>>>,
    shutdown: Arc<AtomicBool>,
}

impl IndexManager {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            catalog: Arc::new(IndexCatalog::new()),
            policy: AdaptivePolicy::new(),
            builder: BackgroundBuilder::new(),
            indexes: Arc::new(RwLock::new(HashMap::new())),
            segments: RwLock::new(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the periodic adaptive tick
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = Duration::from_secs(manager.config.adaptive_tick_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if manager.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                manager.adaptive_tick();
            }
        })
    }

    /// Register segment metadata
    pub fn register_segment(&self, table: &str, segment_id: &str, row_count: usize) {
        self.segments
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(
                segment_id.to_string(),
                SegmentInfo {
                    row_count,
                    created_at: Utc::now().timestamp_millis(),
                },
            );
    }

    /// Remove a segment and every index keyed by it
    pub fn unregister_segment(&self, table: &str, segment_id: &str) {
        if let Some(table_segments) = self.segments.write().get_mut(table) {
            table_segments.remove(segment_id);
        }

        let mut indexes = self.indexes.write();
        if let Some(columns) = indexes.get_mut(table) {
            for segment_indexes in columns.values_mut() {
                segment_indexes.remove(segment_id);
            }
        }
    }

    /// Build indexes for every desired column of a freshly flushed segment
    ///
    /// Builds run in the background; each finished index is installed
    /// under the write lock and its build cost recorded. A failed build is
    /// logged and skipped — queries simply fall back to scanning.
    pub fn on_segment_flushed(&self, table: &str, segment_id: &str, rows: &[Row]) {
        if rows.is_empty() {
            return;
        }

        let desired: Vec<String> = self
            .catalog
            .list_all()
            .into_iter()
            .filter(|spec| spec.table == table)
            .map(|spec| spec.column.clone())
            .collect();

        for column in desired {
            let index = SecondaryIndex::for_column(table, &column, segment_id);
            let handle = match self.builder.submit_build(index, rows.to_vec()) {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(%table, %column, %segment_id, "index build rejected: {}", e);
                    continue;
                }
            };

            let indexes = Arc::clone(&self.indexes);
            let catalog = Arc::clone(&self.catalog);
            let table = table.to_string();
            let segment_id = segment_id.to_string();

            tokio::spawn(async move {
                match handle.await {
                    Ok(Some(built)) => {
                        catalog.record_build_cost(&table, &column, built.build_millis);
                        tracing::debug!(
                            %table,
                            %column,
                            %segment_id,
                            build_millis = built.build_millis,
                            "index installed"
                        );
                        indexes
                            .write()
                            .entry(table)
                            .or_default()
                            .entry(column)
                            .or_default()
                            .insert(segment_id, built.index);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(%table, %column, %segment_id, "index build failed: {}", e);
                    }
                }
            });
        }
    }

    /// Mark a column desired; returns whether an index is already present
    ///
    /// Not retroactive: segments flushed before this call are only picked
    /// up by later flushes.
    pub fn ensure_index(&self, table: &str, column: &str) -> bool {
        self.catalog.mark_desired(table, column);

        self.indexes
            .read()
            .get(table)
            .and_then(|columns| columns.get(column))
            .map(|segments| !segments.is_empty())
            .unwrap_or(false)
    }

    /// Unmark a column and drop all its per-segment indexes
    pub fn drop_index(&self, table: &str, column: &str) {
        self.catalog.unmark_desired(table, column);

        let mut indexes = self.indexes.write();
        if let Some(columns) = indexes.get_mut(table) {
            columns.remove(column);
        }
    }

    /// Union a query's matches across all segments of `(table, column)`
    pub fn lookup(&self, table: &str, column: &str, query: &IndexQuery) -> IndexLookupResult {
        let result = {
            let indexes = self.indexes.read();
            let Some(segment_indexes) =
                indexes.get(table).and_then(|columns| columns.get(column))
            else {
                return IndexLookupResult::empty();
            };

            let mut result = IndexLookupResult {
                matches: HashMap::new(),
                exact: true,
                rows_considered: 0,
            };

            for (segment_id, index) in segment_indexes {
                let matches = match query {
                    IndexQuery::Equals(value) => Some(index.lookup_equals(value)),
                    IndexQuery::In(values) => Some(index.lookup_in(values)),
                    IndexQuery::Range {
                        lo,
                        include_lo,
                        hi,
                        include_hi,
                    } => index.lookup_range(*lo, *include_lo, *hi, *include_hi),
                };

                match matches {
                    Some(matches) if !matches.is_empty() => {
                        result.rows_considered += matches.len();
                        result.matches.insert(segment_id.clone(), matches);
                    }
                    Some(_) => {}
                    // This variant cannot answer the query; a scan must
                    // re-check the predicate
                    None => result.exact = false,
                }
            }
            result
        };

        self.catalog.record_hit(table, column);
        result
    }

    /// Feed the adaptive policy with a column referenced by a query
    pub fn record_query_usage(&self, table: &str, column: &str) {
        // No selectivity estimator yet: every observation is an equals
        // predicate at selectivity 0.1
        self.policy.observe(table, column, false, 0.1);
    }

    /// Apply the policy's build/drop recommendations for every known table
    pub fn adaptive_tick(&self) {
        let mut tables: HashSet<String> = self.segments.read().keys().cloned().collect();
        tables.extend(self.indexes.read().keys().cloned());

        for table in tables {
            let budget_bytes = self.config.memory_budget_mb * 1024 * 1024;
            let to_build = self.policy.recommend_build(
                &table,
                budget_bytes,
                self.config.max_new_per_tick,
            );
            let to_drop = self.policy.recommend_drop(
                &table,
                self.config.max_new_per_tick,
                self.config.stale_drop_ms,
            );

            for column in to_build {
                tracing::info!(%table, %column, "adaptive tick: marking index desired");
                self.ensure_index(&table, &column);
            }
            for column in to_drop {
                tracing::info!(%table, %column, "adaptive tick: dropping index");
                self.drop_index(&table, &column);
            }
        }
    }

    /// Per-index statistics for every installed index
    pub fn index_stats(&self) -> Vec<SecondaryIndexStats> {
        self.indexes
            .read()
            .values()
            .flat_map(|columns| columns.values())
            .flat_map(|segments| segments.values())
            .map(|index| index.stats())
            .collect()
    }

    pub fn stats(&self) -> IndexManagerStats {
        let (total_indexes, memory_bytes) = {
            let indexes = self.indexes.read();
            let mut count = 0;
            let mut memory = 0;
            for columns in indexes.values() {
                for segments in columns.values() {
                    count += segments.len();
                    memory += segments.values().map(|i| i.memory_bytes()).sum::<u64>();
                }
            }
            (count, memory)
        };

        let total_segments = self.segments.read().values().map(|s| s.len()).sum();

        IndexManagerStats {
            total_indexes,
            total_segments,
            memory_bytes,
            memory_budget_mb: self.config.memory_budget_mb,
            builder: self.builder.stats(),
            catalog: self.catalog.stats(),
            policy: self.policy.stats(),
        }
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }

    /// Row count recorded for a segment, if registered
    pub fn segment_row_count(&self, table: &str, segment_id: &str) -> Option<usize> {
        self.segments
            .read()
            .get(table)
            .and_then(|segments| segments.get(segment_id))
            .map(|info| info.row_count)
    }

    /// Stop the adaptive tick and the background builder
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.builder.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Event;

    fn test_config() -> IndexConfig {
        IndexConfig {
            memory_budget_mb: 64,
            max_new_per_tick: 2,
            stale_drop_ms: 604_800_000,
            adaptive_tick_secs: 60,
        }
    }

    fn test_rows() -> Vec<Row> {
        (0..100)
            .map(|i| {
                Row::new(Arc::new(
                    Event::with_timestamp(1000 + i, format!("u{}", i % 10), "click")
                        .prop("region", if i % 2 == 0 { "us" } else { "eu" })
                        .prop("price", (i % 20).to_string()),
                ))
            })
            .collect()
    }

    /// Builds are asynchronous; poll until the lookup sees the index
    async fn wait_for_index(manager: &IndexManager, table: &str, column: &str) {
        for _ in 0..200 {
            if !manager
                .lookup(table, column, &IndexQuery::equals("us"))
                .is_empty()
                || manager
                    .indexes
                    .read()
                    .get(table)
                    .and_then(|c| c.get(column))
                    .map(|s| !s.is_empty())
                    .unwrap_or(false)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("index {}.{} never installed", table, column);
    }

    #[tokio::test]
    async fn test_flush_builds_and_lookup_unions() {
        let manager = IndexManager::new(test_config());
        manager.register_segment("events", "events-1", 100);

        assert!(!manager.ensure_index("events", "region"));
        manager.on_segment_flushed("events", "events-1", &test_rows());
        wait_for_index(&manager, "events", "region").await;

        let result = manager.lookup("events", "region", &IndexQuery::equals("us"));
        assert!(result.exact);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches["events-1"].len(), 50);
        assert_eq!(result.rows_considered, 50);

        // A second segment unions in
        manager.register_segment("events", "events-2", 100);
        manager.on_segment_flushed("events", "events-2", &test_rows());
        for _ in 0..200 {
            if manager
                .lookup("events", "region", &IndexQuery::equals("us"))
                .matches
                .len()
                == 2
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let result = manager.lookup("events", "region", &IndexQuery::equals("us"));
        assert_eq!(result.matches.len(), 2);

        // The index is now present
        assert!(manager.ensure_index("events", "region"));

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_lookup_missing_is_empty_and_inexact() {
        let manager = IndexManager::new(test_config());
        let result = manager.lookup("events", "region", &IndexQuery::equals("us"));
        assert!(result.is_empty());
        assert!(!result.exact);
        assert_eq!(result.rows_considered, 0);
    }

    #[tokio::test]
    async fn test_range_on_bitmap_is_inexact() {
        let manager = IndexManager::new(test_config());
        manager.register_segment("events", "events-1", 100);
        manager.ensure_index("events", "region");
        manager.on_segment_flushed("events", "events-1", &test_rows());
        wait_for_index(&manager, "events", "region").await;

        let result = manager.lookup(
            "events",
            "region",
            &IndexQuery::range(Some(1.0), true, Some(10.0), true),
        );
        assert!(!result.exact);
        assert!(result.is_empty());

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_btree_range_lookup() {
        let manager = IndexManager::new(test_config());
        manager.register_segment("events", "events-1", 100);
        manager.ensure_index("events", "price");
        manager.on_segment_flushed("events", "events-1", &test_rows());

        for _ in 0..200 {
            let result = manager.lookup(
                "events",
                "price",
                &IndexQuery::range(Some(0.0), true, Some(19.0), true),
            );
            if !result.is_empty() {
                assert!(result.exact);
                assert_eq!(result.matches["events-1"].len(), 100);
                manager.shutdown();
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("btree index never installed");
    }

    #[tokio::test]
    async fn test_lookup_records_catalog_hit() {
        let manager = IndexManager::new(test_config());
        manager.ensure_index("events", "region");
        manager.lookup("events", "region", &IndexQuery::equals("us"));

        let spec = manager.catalog().get_spec("events", "region").unwrap();
        assert_eq!(spec.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_unregister_segment_removes_indexes() {
        let manager = IndexManager::new(test_config());
        manager.register_segment("events", "events-1", 100);
        manager.ensure_index("events", "region");
        manager.on_segment_flushed("events", "events-1", &test_rows());
        wait_for_index(&manager, "events", "region").await;

        assert_eq!(manager.segment_row_count("events", "events-1"), Some(100));

        manager.unregister_segment("events", "events-1");
        assert_eq!(manager.segment_row_count("events", "events-1"), None);

        let result = manager.lookup("events", "region", &IndexQuery::equals("us"));
        assert!(result.is_empty());

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_drop_index() {
        let manager = IndexManager::new(test_config());
        manager.register_segment("events", "events-1", 100);
        manager.ensure_index("events", "region");
        manager.on_segment_flushed("events", "events-1", &test_rows());
        wait_for_index(&manager, "events", "region").await;

        manager.drop_index("events", "region");
        assert!(!manager.catalog().is_desired("events", "region"));
        assert!(manager
            .lookup("events", "region", &IndexQuery::equals("us"))
            .is_empty());

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_adaptive_tick_builds_from_observations() {
        let manager = IndexManager::new(test_config());
        manager.register_segment("events", "events-1", 100);

        for _ in 0..50 {
            manager.record_query_usage("events", "region");
        }
        manager.adaptive_tick();

        assert!(manager.catalog().is_desired("events", "region"));
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_adaptive_tick_drops_stale() {
        let config = IndexConfig {
            stale_drop_ms: 10,
            ..test_config()
        };
        let manager = IndexManager::new(config);
        manager.register_segment("events", "events-1", 100);
        manager.record_query_usage("events", "region");
        manager.adaptive_tick();
        assert!(manager.catalog().is_desired("events", "region"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.adaptive_tick();
        assert!(!manager.catalog().is_desired("events", "region"));

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_in_query_lookup() {
        let manager = IndexManager::new(test_config());
        manager.register_segment("events", "events-1", 100);
        manager.ensure_index("events", "region");
        manager.on_segment_flushed("events", "events-1", &test_rows());
        wait_for_index(&manager, "events", "region").await;

        let result = manager.lookup(
            "events",
            "region",
            &IndexQuery::in_list(vec!["us".to_string(), "eu".to_string()]),
        );
        assert_eq!(result.matches["events-1"].len(), 100);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_stats() {
        let manager = IndexManager::new(test_config());
        manager.register_segment("events", "events-1", 100);
        manager.ensure_index("events", "region");
        manager.on_segment_flushed("events", "events-1", &test_rows());
        wait_for_index(&manager, "events", "region").await;

        let stats = manager.stats();
        assert_eq!(stats.total_indexes, 1);
        assert_eq!(stats.total_segments, 1);
        assert!(stats.memory_bytes > 0);
        assert_eq!(stats.memory_budget_mb, 64);
        assert_eq!(stats.catalog.total_specs, 1);

        let per_index = manager.index_stats();
        assert_eq!(per_index.len(), 1);
        assert_eq!(per_index[0].kind, "bitmap");

        manager.shutdown();
    }
}
