//! Query executor
//!
//! Runs a [`PhysicalPlan`] tuple-at-a-time against the [`ColumnStore`].
//! Operators pass a mutable context carrying the current column set, the
//! materialized rows, the raw row views (still needed by Aggregate for
//! per-row column access), and the scan/match counters.
//!
//! # Pipeline
//!
//! ```text
//! Scan → [Aggregate] → Project → [OrderBy] → [Limit] → QueryResult
//! ```

use crate::query::ast::{AggFunc, Expr, OrderItem};
use crate::query::error::QueryError;
use crate::query::expr::{self, Value};
use crate::query::planner::{AggregateSpec, Operator, PhysicalPlan, ProjectionSpec};
use crate::storage::{ColumnStore, Row};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Base columns every scan materializes, in output order
const BASE_COLUMNS: [&str; 4] = ["ts", "table", "userId", "event"];

/// The result of a query execution
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Output column names
    pub columns: Vec<String>,
    /// Output rows; every row has exactly `columns.len()` values
    pub rows: Vec<Vec<Value>>,
    /// Rows read by the scan
    pub scanned_rows: u64,
    /// Rows admitted by the residual predicate
    pub matched_rows: u64,
    /// Wall-clock execution time
    pub elapsed_millis: u64,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup by row index and column name
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }
}

/// Mutable state threaded through the operator pipeline
struct ExecutionContext {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    raw_rows: Vec<Row>,
    scanned: u64,
    matched: u64,
}

impl ExecutionContext {
    fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            raw_rows: Vec::new(),
            scanned: 0,
            matched: 0,
        }
    }
}

/// Executes physical plans against a column store
pub struct Executor {
    store: Arc<ColumnStore>,
}

impl Executor {
    pub fn new(store: Arc<ColumnStore>) -> Self {
        Self { store }
    }

    /// Execute a plan to completion
    pub fn execute(&self, plan: &PhysicalPlan) -> Result<QueryResult, QueryError> {
        let start = Instant::now();
        let mut context = ExecutionContext::new();

        for operator in &plan.operators {
            match operator {
                Operator::Scan {
                    table,
                    from_ts,
                    to_ts,
                    predicate,
                } => self.scan(table, *from_ts, *to_ts, predicate.as_ref(), &mut context)?,
                Operator::Aggregate {
                    group_by,
                    aggregates,
                } => aggregate(group_by, aggregates, &mut context)?,
                Operator::Project { projections } => project(projections, &mut context),
                Operator::OrderBy { items } => order_by(items, &mut context),
                Operator::Limit { limit } => context.rows.truncate(*limit),
            }
        }

        Ok(QueryResult {
            columns: context.columns,
            rows: context.rows,
            scanned_rows: context.scanned,
            matched_rows: context.matched,
            elapsed_millis: start.elapsed().as_millis() as u64,
        })
    }

    fn scan(
        &self,
        table: &str,
        from_ts: i64,
        to_ts: i64,
        predicate: Option<&Expr>,
        context: &mut ExecutionContext,
    ) -> Result<(), QueryError> {
        context.rows.clear();
        context.raw_rows.clear();

        for row in self.store.scan(table, from_ts, to_ts, None) {
            context.scanned += 1;

            let admitted = match predicate {
                Some(expr) => expr::eval_predicate(expr, &row)?,
                None => true,
            };
            if !admitted {
                continue;
            }
            context.matched += 1;

            context.rows.push(vec![
                Value::Int(row.ts()),
                Value::Str(row.table().to_string()),
                match row.user_id() {
                    Some(user) => Value::Str(user.to_string()),
                    None => Value::Null,
                },
                Value::Str(row.event_name().to_string()),
            ]);
            context.raw_rows.push(row);
        }

        context.columns = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        Ok(())
    }
}

/// One accumulator per aggregate spec, per group
enum Accumulator {
    CountAll(i64),
    Count(i64),
    Sum(f64),
    Avg { sum: f64, count: i64 },
    Min(Value),
    Max(Value),
}

impl Accumulator {
    fn new(spec: &AggregateSpec) -> Self {
        match spec.func {
            AggFunc::Count if spec.column.is_none() => Self::CountAll(0),
            AggFunc::Count => Self::Count(0),
            AggFunc::Sum => Self::Sum(0.0),
            AggFunc::Avg => Self::Avg { sum: 0.0, count: 0 },
            AggFunc::Min => Self::Min(Value::Null),
            AggFunc::Max => Self::Max(Value::Null),
        }
    }

    fn add(&mut self, spec: &AggregateSpec, row: &Row) {
        let column_value = |column: &Option<String>| {
            column
                .as_deref()
                .map(|c| expr::column_value(row, c))
                .unwrap_or(Value::Null)
        };

        match self {
            Self::CountAll(count) => *count += 1,
            Self::Count(count) => {
                if !column_value(&spec.column).is_null() {
                    *count += 1;
                }
            }
            Self::Sum(sum) => {
                // Non-numeric values are skipped
                if let Some(v) = column_value(&spec.column).as_f64() {
                    *sum += v;
                }
            }
            Self::Avg { sum, count } => {
                if let Some(v) = column_value(&spec.column).as_f64() {
                    *sum += v;
                    *count += 1;
                }
            }
            Self::Min(current) => {
                let v = column_value(&spec.column);
                if !v.is_null()
                    && (current.is_null()
                        || expr::compare_values(&v, current) == Ordering::Less)
                {
                    *current = v;
                }
            }
            Self::Max(current) => {
                let v = column_value(&spec.column);
                if !v.is_null()
                    && (current.is_null()
                        || expr::compare_values(&v, current) == Ordering::Greater)
                {
                    *current = v;
                }
            }
        }
    }

    fn result(self) -> Value {
        match self {
            Self::CountAll(count) | Self::Count(count) => Value::Int(count),
            Self::Sum(sum) => Value::Float(sum),
            Self::Avg { count: 0, .. } => Value::Null,
            Self::Avg { sum, count } => Value::Float(sum / count as f64),
            Self::Min(value) | Self::Max(value) => value,
        }
    }
}

fn aggregate(
    group_by: &[String],
    aggregates: &[AggregateSpec],
    context: &mut ExecutionContext,
) -> Result<(), QueryError> {
    // Group key: the tuple of group-by column values, nulls kept distinct
    let mut groups: HashMap<Vec<Option<String>>, Vec<Accumulator>> = HashMap::new();

    for row in &context.raw_rows {
        let key: Vec<Option<String>> = group_by
            .iter()
            .map(|column| match expr::column_value(row, column) {
                Value::Null => None,
                value => Some(value.to_string()),
            })
            .collect();

        let accumulators = groups
            .entry(key)
            .or_insert_with(|| aggregates.iter().map(Accumulator::new).collect());

        for (accumulator, spec) in accumulators.iter_mut().zip(aggregates) {
            accumulator.add(spec, row);
        }
    }

    context.rows.clear();
    context.raw_rows.clear();

    for (key, accumulators) in groups {
        let mut row: Vec<Value> = key
            .into_iter()
            .map(|part| match part {
                Some(text) => Value::Str(text),
                None => Value::Null,
            })
            .collect();
        row.extend(accumulators.into_iter().map(Accumulator::result));
        context.rows.push(row);
    }

    context.columns = group_by.to_vec();
    context
        .columns
        .extend(aggregates.iter().map(|spec| spec.alias.clone()));
    Ok(())
}

fn project(projections: &[ProjectionSpec], context: &mut ExecutionContext) {
    let mut new_columns = Vec::new();
    for spec in projections {
        if spec.column == "*" {
            new_columns.extend(context.columns.iter().cloned());
        } else {
            new_columns.push(spec.alias.clone());
        }
    }

    let indices: Vec<Option<usize>> = projections
        .iter()
        .map(|spec| {
            if spec.column == "*" {
                None
            } else {
                Some(
                    context
                        .columns
                        .iter()
                        .position(|c| c == &spec.column)
                        .unwrap_or(usize::MAX),
                )
            }
        })
        .collect();

    let new_rows = context
        .rows
        .iter()
        .map(|row| {
            let mut new_row = Vec::with_capacity(new_columns.len());
            for index in &indices {
                match index {
                    // `*` splices the whole current row
                    None => new_row.extend(row.iter().cloned()),
                    // A reference to a missing column yields null
                    Some(idx) => new_row.push(row.get(*idx).cloned().unwrap_or(Value::Null)),
                }
            }
            new_row
        })
        .collect();

    context.columns = new_columns;
    context.rows = new_rows;
}

fn order_by(items: &[OrderItem], context: &mut ExecutionContext) {
    let keys: Vec<(Option<usize>, bool)> = items
        .iter()
        .map(|item| {
            (
                context.columns.iter().position(|c| c == &item.column),
                item.asc,
            )
        })
        .collect();

    // Stable sort: rows equal under all keys keep their scan order
    context.rows.sort_by(|left, right| {
        for (index, asc) in &keys {
            let Some(index) = index else { continue };
            let l = left.get(*index).unwrap_or(&Value::Null);
            let r = right.get(*index).unwrap_or(&Value::Null);
            let ord = expr::compare_values(l, r);
            if ord != Ordering::Equal {
                return if *asc { ord } else { ord.reverse() };
            }
        }
        Ordering::Equal
    });
}
