//! Adaptive index policy
//!
//! Keeps a rolling window of predicate observations per `(table, column)`
//! and ranks columns as index build candidates. The score rewards query
//! rate, selective predicates, and equals/range usage, and penalizes high
//! estimated cardinality:
//!
//! ```text
//! score = w_qps · qps
//!       + w_sel · (1 − avg_selectivity)
//!       + w_eq  · equals_ratio
//!       + w_rng · range_ratio
//!       − w_card · log10(max(1, estimated_cardinality))
//! ```
//!
//! Build recommendations are greedily packed into a memory budget; drop
//! recommendations are columns whose observations have gone stale.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;

const W_QPS: f64 = 1.0;
const W_SELECTIVITY: f64 = 2.0;
const W_EQUALS: f64 = 1.5;
const W_RANGE: f64 = 2.0;
const W_CARDINALITY: f64 = 0.5;

const DEFAULT_WINDOW_MILLIS: i64 = 60_000;
const DEFAULT_MAX_OBSERVATIONS: usize = 1_000;

#[derive(Debug, Clone, Copy)]
struct Observation {
    timestamp: i64,
    is_range: bool,
    selectivity: f64,
}

/// Policy statistics
#[derive(Debug, Clone, Serialize)]
pub struct PolicyStats {
    pub tracked_columns: usize,
    pub total_observations: usize,
    pub total_qps: f64,
}

/// Rolling-window predicate observer and index recommender
#[derive(Debug)]
pub struct AdaptivePolicy {
    window_millis: i64,
    max_observations: usize,
    observations: DashMap<(String, String), Vec<Observation>>,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptivePolicy {
    pub fn new() -> Self {
        Self {
            window_millis: DEFAULT_WINDOW_MILLIS,
            max_observations: DEFAULT_MAX_OBSERVATIONS,
            observations: DashMap::new(),
        }
    }

    /// Record one observed predicate on a column
    ///
    /// Selectivity is clamped to `[0, 1]`. Observations older than the
    /// window are pruned on every append, and the per-column history is
    /// capped at `max_observations`.
    pub fn observe(&self, table: &str, column: &str, is_range: bool, selectivity: f64) {
        let now = Utc::now().timestamp_millis();
        let observation = Observation {
            timestamp: now,
            is_range,
            selectivity: selectivity.clamp(0.0, 1.0),
        };

        let mut entry = self
            .observations
            .entry((table.to_string(), column.to_string()))
            .or_default();
        entry.push(observation);
        entry.retain(|obs| now - obs.timestamp <= self.window_millis);
        if entry.len() > self.max_observations {
            let excess = entry.len() - self.max_observations;
            entry.drain(..excess);
        }
    }

    /// Columns of `table` worth building indexes for, best first, packed
    /// into `memory_budget_bytes` and capped at `max_new`
    pub fn recommend_build(
        &self,
        table: &str,
        memory_budget_bytes: u64,
        max_new: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f64, u64)> = self
            .observations
            .iter()
            .filter(|entry| entry.key().0 == table && !entry.is_empty())
            .map(|entry| {
                let column = entry.key().1.clone();
                let score = score(&entry);
                let memory = estimate_index_memory(&column, &entry);
                (column, score, memory)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut recommendations = Vec::new();
        let mut used: u64 = 0;
        for (column, _, memory) in scored {
            if recommendations.len() >= max_new {
                break;
            }
            if used + memory <= memory_budget_bytes {
                used += memory;
                recommendations.push(column);
            }
        }
        recommendations
    }

    /// Columns of `table` whose newest observation is older than
    /// `stale_millis` (or which have none at all), capped at `max_drop`
    pub fn recommend_drop(&self, table: &str, max_drop: usize, stale_millis: i64) -> Vec<String> {
        let now = Utc::now().timestamp_millis();
        let mut recommendations = Vec::new();

        for entry in self.observations.iter() {
            if entry.key().0 != table {
                continue;
            }
            let newest = entry.iter().map(|obs| obs.timestamp).max();
            let stale = match newest {
                None => true,
                Some(ts) => now - ts > stale_millis,
            };
            if stale {
                recommendations.push(entry.key().1.clone());
            }
            if recommendations.len() >= max_drop {
                break;
            }
        }
        recommendations
    }

    pub fn stats(&self) -> PolicyStats {
        let total_observations = self.observations.iter().map(|entry| entry.len()).sum();
        let total_qps = self.observations.iter().map(|entry| qps(&entry)).sum();

        PolicyStats {
            tracked_columns: self.observations.len(),
            total_observations,
            total_qps,
        }
    }

    pub fn clear(&self) {
        self.observations.clear();
    }
}

fn score(observations: &[Observation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }

    let avg_selectivity = avg_selectivity(observations);
    let range_count = observations.iter().filter(|obs| obs.is_range).count();
    let range_ratio = range_count as f64 / observations.len() as f64;
    let equals_ratio = 1.0 - range_ratio;
    let cardinality = estimate_cardinality(observations);

    let score = W_QPS * qps(observations)
        + W_SELECTIVITY * (1.0 - avg_selectivity)
        + W_EQUALS * equals_ratio
        + W_RANGE * range_ratio
        - W_CARDINALITY * cardinality.max(1.0).log10();

    score.max(0.0)
}

fn qps(observations: &[Observation]) -> f64 {
    let Some(first) = observations.first() else {
        return 0.0;
    };
    let now = Utc::now().timestamp_millis();
    let window = (now - first.timestamp).min(DEFAULT_WINDOW_MILLIS) as f64;
    observations.len() as f64 * 1000.0 / window.max(1.0)
}

fn avg_selectivity(observations: &[Observation]) -> f64 {
    if observations.is_empty() {
        return 1.0;
    }
    observations.iter().map(|obs| obs.selectivity).sum::<f64>() / observations.len() as f64
}

/// Lower average selectivity suggests higher cardinality
fn estimate_cardinality(observations: &[Observation]) -> f64 {
    (1.0 / avg_selectivity(observations).max(0.001)).max(1.0)
}

/// BTree shape ≈ 20 bytes per observation; bitmap shape ≈ 100 bytes per
/// estimated distinct value
fn estimate_index_memory(column: &str, observations: &[Observation]) -> u64 {
    let numeric_shape = column == "ts" || observations.iter().any(|obs| obs.is_range);
    if numeric_shape {
        observations.len() as u64 * 20
    } else {
        (estimate_cardinality(observations) * 100.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_recommend() {
        let policy = AdaptivePolicy::new();
        for _ in 0..100 {
            policy.observe("events", "props.region", false, 0.1);
        }

        let recommendations = policy.recommend_build("events", 1024 * 1024, 5);
        assert!(recommendations.contains(&"props.region".to_string()));
    }

    #[test]
    fn test_recommendations_are_per_table() {
        let policy = AdaptivePolicy::new();
        policy.observe("events", "region", false, 0.1);
        policy.observe("orders", "sku", false, 0.1);

        let recommendations = policy.recommend_build("events", 1024 * 1024, 5);
        assert_eq!(recommendations, vec!["region"]);
    }

    #[test]
    fn test_max_new_cap() {
        let policy = AdaptivePolicy::new();
        for _ in 0..50 {
            policy.observe("events", "region", false, 0.1);
            policy.observe("events", "price", true, 0.2);
            policy.observe("events", "userId", false, 0.05);
        }

        let limited = policy.recommend_build("events", 1024 * 1024, 1);
        assert_eq!(limited.len(), 1);

        let all = policy.recommend_build("events", 1024 * 1024, 10);
        assert!(all.len() > limited.len());
    }

    #[test]
    fn test_budget_packing() {
        let policy = AdaptivePolicy::new();
        for _ in 0..50 {
            policy.observe("events", "region", false, 0.1);
            policy.observe("events", "price", true, 0.2);
        }

        // Budget below any single estimate yields nothing
        let none = policy.recommend_build("events", 10, 10);
        assert!(none.is_empty());

        // The estimated memory of what is recommended never exceeds budget:
        // price is btree-shaped (50 obs · 20 = 1000), region is
        // bitmap-shaped (cardinality 10 · 100 = 1000)
        let some = policy.recommend_build("events", 1500, 10);
        assert_eq!(some.len(), 1);

        let both = policy.recommend_build("events", 2000, 10);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn test_recommend_drop_stale() {
        let policy = AdaptivePolicy::new();
        policy.observe("events", "stale_column", false, 0.1);

        assert!(policy.recommend_drop("events", 5, 60_000).is_empty());

        std::thread::sleep(std::time::Duration::from_millis(30));
        let to_drop = policy.recommend_drop("events", 5, 10);
        assert_eq!(to_drop, vec!["stale_column"]);
    }

    #[test]
    fn test_selectivity_clamped() {
        let policy = AdaptivePolicy::new();
        policy.observe("events", "region", false, 7.5);
        policy.observe("events", "region", false, -2.0);

        // Clamped observations still keep the column recommendable
        let stats = policy.stats();
        assert_eq!(stats.tracked_columns, 1);
        assert_eq!(stats.total_observations, 2);
    }

    #[test]
    fn test_observation_cap() {
        let policy = AdaptivePolicy::new();
        for _ in 0..(DEFAULT_MAX_OBSERVATIONS + 100) {
            policy.observe("events", "region", false, 0.1);
        }

        assert_eq!(policy.stats().total_observations, DEFAULT_MAX_OBSERVATIONS);
    }

    #[test]
    fn test_clear() {
        let policy = AdaptivePolicy::new();
        policy.observe("events", "region", false, 0.1);
        policy.clear();
        assert_eq!(policy.stats().tracked_columns, 0);
    }
}
