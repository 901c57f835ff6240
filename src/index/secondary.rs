//! Secondary index kinds
//!
//! Two per-segment index variants behind one enum:
//!
//! - [`BitmapIndex`]: value → row bitmap, for low-to-medium cardinality
//!   string columns. Equals and IN lookups; range lookups are unsupported.
//! - [`BTreeIndex`]: sorted `(value, row)` pairs for numeric columns.
//!   Range lookups; equals is a degenerate range.
//!
//! Which variant a column gets is a name heuristic: `ts` and columns whose
//! name suggests numeric content go to the B-tree, everything else to the
//! bitmap.

use crate::index::row_set::RowSet;
use crate::query::expr::{self, Value};
use crate::storage::Row;
use roaring::RoaringBitmap;
use serde::Serialize;
use std::collections::HashMap;

/// Column names that suggest numeric content
const NUMERIC_NAME_HINTS: [&str; 4] = ["price", "amount", "count", "size"];

/// Whether a column should get a B-tree (numeric) index
pub fn looks_numeric(column: &str) -> bool {
    column == "ts" || NUMERIC_NAME_HINTS.iter().any(|hint| column.contains(hint))
}

/// Per-index statistics
#[derive(Debug, Clone, Serialize)]
pub struct SecondaryIndexStats {
    pub kind: &'static str,
    pub table: String,
    pub column: String,
    pub segment_id: String,
    /// Distinct values (bitmap) or stored entries (btree)
    pub entries: usize,
    pub row_count: usize,
    pub memory_bytes: u64,
}

/// A per-(table, column, segment) secondary index
#[derive(Debug)]
pub enum SecondaryIndex {
    Bitmap(BitmapIndex),
    BTree(BTreeIndex),
}

impl SecondaryIndex {
    /// Create the appropriate variant for a column
    pub fn for_column(
        table: impl Into<String>,
        column: impl Into<String>,
        segment_id: impl Into<String>,
    ) -> Self {
        let column = column.into();
        if looks_numeric(&column) {
            Self::BTree(BTreeIndex::new(table, column, segment_id))
        } else {
            Self::Bitmap(BitmapIndex::new(table, column, segment_id))
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::Bitmap(index) => &index.table,
            Self::BTree(index) => &index.table,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Bitmap(index) => &index.column,
            Self::BTree(index) => &index.column,
        }
    }

    pub fn segment_id(&self) -> &str {
        match self {
            Self::Bitmap(index) => &index.segment_id,
            Self::BTree(index) => &index.segment_id,
        }
    }

    /// Populate the index from a segment's rows
    pub fn build(&mut self, rows: &[Row]) {
        match self {
            Self::Bitmap(index) => index.build(rows),
            Self::BTree(index) => index.build(rows),
        }
    }

    pub fn lookup_equals(&self, value: &str) -> RowSet {
        match self {
            Self::Bitmap(index) => index.lookup_equals(value),
            Self::BTree(index) => index.lookup_equals(value),
        }
    }

    pub fn lookup_in(&self, values: &[String]) -> RowSet {
        match self {
            Self::Bitmap(index) => index.lookup_in(values),
            Self::BTree(index) => index.lookup_in(values),
        }
    }

    /// Range lookup; `None` means the variant does not support ranges and
    /// the caller must fall back to a scan
    pub fn lookup_range(
        &self,
        lo: Option<f64>,
        include_lo: bool,
        hi: Option<f64>,
        include_hi: bool,
    ) -> Option<RowSet> {
        match self {
            Self::Bitmap(_) => None,
            Self::BTree(index) => Some(index.lookup_range(lo, include_lo, hi, include_hi)),
        }
    }

    pub fn memory_bytes(&self) -> u64 {
        match self {
            Self::Bitmap(index) => index.memory_bytes(),
            Self::BTree(index) => index.memory_bytes(),
        }
    }

    pub fn stats(&self) -> SecondaryIndexStats {
        match self {
            Self::Bitmap(index) => SecondaryIndexStats {
                kind: "bitmap",
                table: index.table.clone(),
                column: index.column.clone(),
                segment_id: index.segment_id.clone(),
                entries: index.values.len(),
                row_count: index.row_count,
                memory_bytes: index.memory_bytes(),
            },
            Self::BTree(index) => SecondaryIndexStats {
                kind: "btree",
                table: index.table.clone(),
                column: index.column.clone(),
                segment_id: index.segment_id.clone(),
                entries: index.entries.len(),
                row_count: index.row_count,
                memory_bytes: index.memory_bytes(),
            },
        }
    }
}

/// The string form of a column's value in a row, if present
fn string_value(row: &Row, column: &str) -> Option<String> {
    match expr::column_value(row, column) {
        Value::Null => None,
        value => Some(value.to_string()),
    }
}

/// The numeric form of a column's value in a row, if coercible
fn numeric_value(row: &Row, column: &str) -> Option<f64> {
    expr::column_value(row, column).as_f64()
}

/// Value → row-position bitmap for string columns
#[derive(Debug)]
pub struct BitmapIndex {
    table: String,
    column: String,
    segment_id: String,
    values: HashMap<String, RoaringBitmap>,
    row_count: usize,
}

impl BitmapIndex {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        segment_id: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            segment_id: segment_id.into(),
            values: HashMap::new(),
            row_count: 0,
        }
    }

    pub fn build(&mut self, rows: &[Row]) {
        self.values.clear();
        self.row_count = rows.len();

        for (position, row) in rows.iter().enumerate() {
            // Null values are simply absent from the index
            if let Some(value) = string_value(row, &self.column) {
                self.values
                    .entry(value)
                    .or_default()
                    .insert(position as u32);
            }
        }
    }

    pub fn lookup_equals(&self, value: &str) -> RowSet {
        match self.values.get(value) {
            Some(bits) => RowSet::Bitmap(bits.clone()),
            None => RowSet::empty(),
        }
    }

    pub fn lookup_in(&self, values: &[String]) -> RowSet {
        let mut result = RoaringBitmap::new();
        for value in values {
            if let Some(bits) = self.values.get(value) {
                result |= bits;
            }
        }
        RowSet::Bitmap(result)
    }

    pub fn memory_bytes(&self) -> u64 {
        let values: u64 = self
            .values
            .iter()
            .map(|(key, bits)| key.len() as u64 + bits.serialized_size() as u64)
            .sum();
        values + 64
    }
}

/// Sorted `(value, row)` pairs for numeric columns
#[derive(Debug)]
pub struct BTreeIndex {
    table: String,
    column: String,
    segment_id: String,
    entries: Vec<(f64, u32)>,
    row_count: usize,
}

impl BTreeIndex {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        segment_id: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            segment_id: segment_id.into(),
            entries: Vec::new(),
            row_count: 0,
        }
    }

    pub fn build(&mut self, rows: &[Row]) {
        self.entries.clear();
        self.row_count = rows.len();

        for (position, row) in rows.iter().enumerate() {
            if let Some(value) = numeric_value(row, &self.column) {
                self.entries.push((value, position as u32));
            }
        }

        self.entries.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    pub fn lookup_equals(&self, value: &str) -> RowSet {
        match value.trim().parse::<f64>() {
            Ok(v) if !v.is_nan() => self.lookup_range(Some(v), true, Some(v), true),
            _ => RowSet::empty(),
        }
    }

    pub fn lookup_in(&self, values: &[String]) -> RowSet {
        let mut result = RowSet::empty();
        for value in values {
            result.union_with(&self.lookup_equals(value));
        }
        result
    }

    pub fn lookup_range(
        &self,
        lo: Option<f64>,
        include_lo: bool,
        hi: Option<f64>,
        include_hi: bool,
    ) -> RowSet {
        let (Some(lo), Some(hi)) = (lo, hi) else {
            return RowSet::empty();
        };

        let mut result = RowSet::empty();
        for (value, position) in &self.entries {
            let above = if include_lo { *value >= lo } else { *value > lo };
            let below = if include_hi { *value <= hi } else { *value < hi };
            if above && below {
                result.add(*position);
            }
        }
        result
    }

    pub fn memory_bytes(&self) -> u64 {
        self.entries.len() as u64 * 16 + 64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Event;
    use std::sync::Arc;

    /// Deterministic test segment: 1000 rows over a few dimensions
    fn test_rows() -> Vec<Row> {
        let regions = ["us", "eu", "apac"];
        let events = ["click", "purchase"];

        // Small LCG keeps prices varied but reproducible
        let mut seed: u64 = 42;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) % 100 + 1
        };

        (0..1000)
            .map(|i| {
                let event = Event::with_timestamp(
                    1_000_000 + i as i64,
                    format!("u{}", i % 10 + 1),
                    events[i % events.len()],
                )
                .prop("region", regions[i % regions.len()])
                .prop("price", next().to_string());
                Row::new(Arc::new(event))
            })
            .collect()
    }

    #[test]
    fn test_looks_numeric() {
        assert!(looks_numeric("ts"));
        assert!(looks_numeric("price"));
        assert!(looks_numeric("props.amount"));
        assert!(looks_numeric("item_count"));
        assert!(!looks_numeric("region"));
        assert!(!looks_numeric("userId"));
    }

    #[test]
    fn test_for_column_picks_variant() {
        assert!(matches!(
            SecondaryIndex::for_column("events", "ts", "s1"),
            SecondaryIndex::BTree(_)
        ));
        assert!(matches!(
            SecondaryIndex::for_column("events", "price", "s1"),
            SecondaryIndex::BTree(_)
        ));
        assert!(matches!(
            SecondaryIndex::for_column("events", "region", "s1"),
            SecondaryIndex::Bitmap(_)
        ));
    }

    #[test]
    fn test_bitmap_equals() {
        let rows = test_rows();
        let mut index = BitmapIndex::new("events", "region", "segment1");
        index.build(&rows);

        let matches = index.lookup_equals("us");
        let expected = rows
            .iter()
            .filter(|r| r.property("region") == Some("us"))
            .count() as u64;
        assert_eq!(matches.len(), expected);
        assert!(!matches.is_empty());

        for position in matches.iter() {
            assert_eq!(rows[position as usize].property("region"), Some("us"));
        }

        assert!(index.lookup_equals("nowhere").is_empty());
    }

    #[test]
    fn test_bitmap_in() {
        let rows = test_rows();
        let mut index = BitmapIndex::new("events", "region", "segment1");
        index.build(&rows);

        let matches = index.lookup_in(&["us".to_string(), "eu".to_string()]);
        let expected = rows
            .iter()
            .filter(|r| matches!(r.property("region"), Some("us") | Some("eu")))
            .count() as u64;
        assert_eq!(matches.len(), expected);
    }

    #[test]
    fn test_bitmap_range_unsupported() {
        let rows = test_rows();
        let mut index = SecondaryIndex::for_column("events", "region", "segment1");
        index.build(&rows);

        assert!(index
            .lookup_range(Some(1.0), true, Some(10.0), true)
            .is_none());
    }

    #[test]
    fn test_bitmap_skips_null_values() {
        let rows = vec![
            Row::new(Arc::new(
                Event::with_timestamp(1, "u1", "click").prop("region", "us"),
            )),
            Row::new(Arc::new(Event::with_timestamp(2, "u2", "click"))),
        ];
        let mut index = BitmapIndex::new("events", "region", "s1");
        index.build(&rows);

        assert_eq!(index.lookup_equals("us").to_vec(), vec![0]);
    }

    #[test]
    fn test_btree_range() {
        let rows = test_rows();
        let mut index = BTreeIndex::new("events", "price", "segment1");
        index.build(&rows);

        let matches = index.lookup_range(Some(10.0), true, Some(20.0), true);
        assert!(!matches.is_empty());

        for position in matches.iter() {
            let price: f64 = rows[position as usize]
                .property("price")
                .unwrap()
                .parse()
                .unwrap();
            assert!((10.0..=20.0).contains(&price));
        }

        // Exclusive bounds drop the endpoints
        let inclusive = index.lookup_range(Some(10.0), true, Some(20.0), true);
        let exclusive = index.lookup_range(Some(10.0), false, Some(20.0), false);
        assert!(exclusive.len() <= inclusive.len());
    }

    #[test]
    fn test_btree_equals_and_in() {
        let rows = test_rows();
        let mut index = BTreeIndex::new("events", "price", "segment1");
        index.build(&rows);

        let target = rows[0].property("price").unwrap();
        let matches = index.lookup_equals(target);
        assert!(matches.contains(0));
        for position in matches.iter() {
            assert_eq!(rows[position as usize].property("price"), Some(target));
        }

        assert!(index.lookup_equals("not-a-number").is_empty());

        let other = rows[1].property("price").unwrap();
        let both = index.lookup_in(&[target.to_string(), other.to_string()]);
        assert!(both.len() >= matches.len());
    }

    #[test]
    fn test_btree_open_bounds_are_empty() {
        let rows = test_rows();
        let mut index = BTreeIndex::new("events", "price", "segment1");
        index.build(&rows);

        assert!(index.lookup_range(None, true, Some(10.0), true).is_empty());
        assert!(index.lookup_range(Some(10.0), true, None, true).is_empty());
    }

    #[test]
    fn test_btree_on_ts() {
        let rows = test_rows();
        let mut index = SecondaryIndex::for_column("events", "ts", "segment1");
        index.build(&rows);

        let matches = index
            .lookup_range(Some(1_000_000.0), true, Some(1_000_009.0), true)
            .unwrap();
        assert_eq!(matches.len(), 10);
    }

    #[test]
    fn test_stats_and_memory() {
        let rows = test_rows();

        let mut bitmap = SecondaryIndex::for_column("events", "region", "segment1");
        bitmap.build(&rows);
        let stats = bitmap.stats();
        assert_eq!(stats.kind, "bitmap");
        assert_eq!(stats.table, "events");
        assert_eq!(stats.segment_id, "segment1");
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.row_count, 1000);
        assert!(stats.memory_bytes > 0);

        let mut btree = SecondaryIndex::for_column("events", "price", "segment1");
        btree.build(&rows);
        let stats = btree.stats();
        assert_eq!(stats.kind, "btree");
        assert_eq!(stats.entries, 1000);
        assert!(stats.memory_bytes > 0);
    }
}
