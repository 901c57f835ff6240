//! Index catalog
//!
//! Thread-safe metadata about which `(table, column)` pairs are desired
//! index targets, plus usage statistics that drive staleness decisions.
//! Marking a column desired does not build anything by itself; builds
//! happen when segments flush.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Metadata for one desired index target
#[derive(Debug)]
pub struct IndexSpec {
    pub table: String,
    pub column: String,
    pub created_at: i64,
    last_used_at: AtomicI64,
    hit_count: AtomicU64,
    build_cost_millis: AtomicU64,
}

impl IndexSpec {
    fn new(table: &str, column: &str) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            table: table.to_string(),
            column: column.to_string(),
            created_at: now,
            last_used_at: AtomicI64::new(now),
            hit_count: AtomicU64::new(0),
            build_cost_millis: AtomicU64::new(0),
        }
    }

    pub fn last_used_at(&self) -> i64 {
        self.last_used_at.load(Ordering::Relaxed)
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn build_cost_millis(&self) -> u64 {
        self.build_cost_millis.load(Ordering::Relaxed)
    }
}

/// Catalog statistics
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub total_specs: usize,
    pub total_hits: u64,
    pub total_build_cost_millis: u64,
    pub oldest_created_at: Option<i64>,
    pub newest_created_at: Option<i64>,
}

/// Thread-safe `(table, column)` → [`IndexSpec`] mapping
#[derive(Debug, Default)]
pub struct IndexCatalog {
    specs: DashMap<(String, String), Arc<IndexSpec>>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a column as a desired index target
    pub fn mark_desired(&self, table: &str, column: &str) {
        self.specs
            .entry((table.to_string(), column.to_string()))
            .or_insert_with(|| Arc::new(IndexSpec::new(table, column)));
    }

    /// Remove the desired marking
    pub fn unmark_desired(&self, table: &str, column: &str) {
        self.specs
            .remove(&(table.to_string(), column.to_string()));
    }

    pub fn is_desired(&self, table: &str, column: &str) -> bool {
        self.specs
            .contains_key(&(table.to_string(), column.to_string()))
    }

    pub fn list_all(&self) -> Vec<Arc<IndexSpec>> {
        self.specs.iter().map(|entry| Arc::clone(&entry)).collect()
    }

    pub fn get_spec(&self, table: &str, column: &str) -> Option<Arc<IndexSpec>> {
        self.specs
            .get(&(table.to_string(), column.to_string()))
            .map(|entry| Arc::clone(&entry))
    }

    /// Record a lookup hit
    pub fn record_hit(&self, table: &str, column: &str) {
        if let Some(spec) = self.get_spec(table, column) {
            spec.hit_count.fetch_add(1, Ordering::Relaxed);
            spec.last_used_at
                .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        }
    }

    /// Record how long a build took
    pub fn record_build_cost(&self, table: &str, column: &str, build_millis: u64) {
        if let Some(spec) = self.get_spec(table, column) {
            spec.build_cost_millis.store(build_millis, Ordering::Relaxed);
        }
    }

    /// Specs whose last use is older than `now - threshold_millis`
    pub fn stale_specs(&self, threshold_millis: i64) -> Vec<Arc<IndexSpec>> {
        let now = Utc::now().timestamp_millis();
        self.specs
            .iter()
            .filter(|entry| now - entry.last_used_at() > threshold_millis)
            .map(|entry| Arc::clone(&entry))
            .collect()
    }

    pub fn stats(&self) -> CatalogStats {
        let mut total_hits = 0;
        let mut total_build_cost_millis = 0;
        let mut oldest: Option<i64> = None;
        let mut newest: Option<i64> = None;

        for entry in self.specs.iter() {
            total_hits += entry.hit_count();
            total_build_cost_millis += entry.build_cost_millis();
            oldest = Some(oldest.map_or(entry.created_at, |o: i64| o.min(entry.created_at)));
            newest = Some(newest.map_or(entry.created_at, |n: i64| n.max(entry.created_at)));
        }

        CatalogStats {
            total_specs: self.specs.len(),
            total_hits,
            total_build_cost_millis,
            oldest_created_at: oldest,
            newest_created_at: newest,
        }
    }

    pub fn clear(&self) {
        self.specs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_unmark() {
        let catalog = IndexCatalog::new();
        assert!(!catalog.is_desired("events", "userId"));

        catalog.mark_desired("events", "userId");
        assert!(catalog.is_desired("events", "userId"));
        assert_eq!(catalog.list_all().len(), 1);

        catalog.unmark_desired("events", "userId");
        assert!(!catalog.is_desired("events", "userId"));
    }

    #[test]
    fn test_mark_desired_is_idempotent() {
        let catalog = IndexCatalog::new();
        catalog.mark_desired("events", "userId");
        catalog.record_hit("events", "userId");

        // Re-marking must not reset usage statistics
        catalog.mark_desired("events", "userId");
        assert_eq!(catalog.get_spec("events", "userId").unwrap().hit_count(), 1);
    }

    #[test]
    fn test_record_hit() {
        let catalog = IndexCatalog::new();
        catalog.mark_desired("events", "userId");

        catalog.record_hit("events", "userId");
        catalog.record_hit("events", "userId");

        let spec = catalog.get_spec("events", "userId").unwrap();
        assert_eq!(spec.hit_count(), 2);
        assert!(spec.last_used_at() >= spec.created_at);

        // Hits for unknown specs are ignored
        catalog.record_hit("events", "missing");
    }

    #[test]
    fn test_record_build_cost() {
        let catalog = IndexCatalog::new();
        catalog.mark_desired("events", "price");
        catalog.record_build_cost("events", "price", 42);

        assert_eq!(
            catalog.get_spec("events", "price").unwrap().build_cost_millis(),
            42
        );
    }

    #[test]
    fn test_stale_specs() {
        let catalog = IndexCatalog::new();
        catalog.mark_desired("events", "userId");

        // Freshly created specs are not stale under a generous threshold
        assert!(catalog.stale_specs(60_000).is_empty());

        std::thread::sleep(std::time::Duration::from_millis(30));
        let stale = catalog.stale_specs(10);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].column, "userId");
    }

    #[test]
    fn test_stats_and_clear() {
        let catalog = IndexCatalog::new();
        catalog.mark_desired("events", "a");
        catalog.mark_desired("events", "b");
        catalog.record_hit("events", "a");

        let stats = catalog.stats();
        assert_eq!(stats.total_specs, 2);
        assert_eq!(stats.total_hits, 1);
        assert!(stats.oldest_created_at.is_some());

        catalog.clear();
        assert_eq!(catalog.stats().total_specs, 0);
        assert!(catalog.stats().oldest_created_at.is_none());
    }
}
