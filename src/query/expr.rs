//! Expression evaluation
//!
//! The [`Value`] sum type, comparison with numeric coercion, predicate
//! evaluation against rows, and the time-range pushdown machinery
//! (extraction of `ts` constraints from a WHERE tree plus removal of the
//! extracted constraints so rows are not filtered twice).

use crate::query::ast::{CompareOp, Expr, Literal};
use crate::query::error::QueryError;
use crate::storage::Row;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// A runtime value: null, integer, float, or string
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric coercion: integers and floats directly, strings via parsing
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Int(v) => Value::Int(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// Compare two values with type coercion
///
/// Nulls sort below everything and equal each other. Two operands that
/// both coerce to numbers compare numerically; otherwise their textual
/// forms compare case-insensitively.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }

    left.to_string()
        .to_lowercase()
        .cmp(&right.to_string().to_lowercase())
}

/// Equality under the same coercion rules as [`compare_values`]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Ordering::Equal
}

/// Case-insensitive prefix match for `LIKE 'prefix%'`
pub fn like_prefix(text: &str, prefix: &str) -> bool {
    text.to_lowercase().starts_with(&prefix.to_lowercase())
}

/// Resolve a column against a row
///
/// Base columns (`ts`/`timestamp`, `table`, `userId`/`user_id`, `event`)
/// match case-insensitively; anything else consults the property bag with
/// the original casing, with an optional `props.` prefix stripped first.
/// Missing properties resolve to null.
pub fn column_value(row: &Row, column: &str) -> Value {
    match column.to_lowercase().as_str() {
        "ts" | "timestamp" => Value::Int(row.ts()),
        "table" => Value::Str(row.table().to_string()),
        "userid" | "user_id" => match row.user_id() {
            Some(user) => Value::Str(user.to_string()),
            None => Value::Null,
        },
        "event" => Value::Str(row.event_name().to_string()),
        _ => {
            let key = column.strip_prefix("props.").unwrap_or(column);
            match row.property(key) {
                Some(value) => Value::Str(value.to_string()),
                None => Value::Null,
            }
        }
    }
}

/// Evaluate a WHERE expression against a row
pub fn eval_predicate(expr: &Expr, row: &Row) -> Result<bool, QueryError> {
    match expr {
        Expr::And(left, right) => Ok(eval_predicate(left, row)? && eval_predicate(right, row)?),
        Expr::Or(left, right) => Ok(eval_predicate(left, row)? || eval_predicate(right, row)?),
        Expr::Compare { op, left, right } => {
            let l = eval_value(left, row)?;
            let r = eval_value(right, row)?;
            let ord = compare_values(&l, &r);
            Ok(match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Ne => ord != Ordering::Equal,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Ge => ord != Ordering::Less,
            })
        }
        Expr::InList { expr, values } => {
            let target = eval_value(expr, row)?;
            for candidate in values {
                if values_equal(&target, &eval_value(candidate, row)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::Between { expr, low, high } => {
            let target = eval_value(expr, row)?;
            let lo = eval_value(low, row)?;
            let hi = eval_value(high, row)?;
            Ok(compare_values(&target, &lo) != Ordering::Less
                && compare_values(&target, &hi) != Ordering::Greater)
        }
        Expr::LikePrefix { expr, prefix } => {
            let target = eval_value(expr, row)?;
            if target.is_null() {
                return Ok(false);
            }
            Ok(like_prefix(&target.to_string(), prefix))
        }
        Expr::Column(_) | Expr::Literal(_) => Err(QueryError::execution(
            "Predicate",
            format!("expression is not a boolean predicate: {}", expr),
        )),
    }
}

fn eval_value(expr: &Expr, row: &Row) -> Result<Value, QueryError> {
    match expr {
        Expr::Column(name) => Ok(column_value(row, name)),
        Expr::Literal(literal) => Ok(Value::from(literal)),
        other => Err(QueryError::execution(
            "Predicate",
            format!("cannot evaluate expression as a value: {}", other),
        )),
    }
}

/// An inclusive `[from_ts, to_ts]` scan window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from_ts: i64,
    pub to_ts: i64,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self {
            from_ts: i64::MIN,
            to_ts: i64::MAX,
        }
    }
}

fn is_timestamp_column(expr: &Expr) -> bool {
    match expr {
        Expr::Column(name) => {
            let lower = name.to_lowercase();
            lower == "ts" || lower == "timestamp"
        }
        _ => false,
    }
}

fn integer_literal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(Literal::Int(v)) => Some(*v),
        _ => None,
    }
}

/// Extract a `ts` constraint from a WHERE tree, if one exists
///
/// `ts BETWEEN a AND b` maps to `[a, b]`; comparisons with an integer
/// literal map to half-ranges (flipped when the literal is on the left);
/// ranges on both sides of an AND intersect; OR abandons the pushdown.
pub fn extract_time_range(expr: &Expr) -> Option<TimeRange> {
    match expr {
        Expr::Between { expr, low, high } if is_timestamp_column(expr) => {
            let from_ts = integer_literal(low)?;
            let to_ts = integer_literal(high)?;
            Some(TimeRange { from_ts, to_ts })
        }
        Expr::Compare { op, left, right } => {
            if is_timestamp_column(left) {
                let v = integer_literal(right)?;
                comparison_range(*op, v, false)
            } else if is_timestamp_column(right) {
                let v = integer_literal(left)?;
                comparison_range(*op, v, true)
            } else {
                None
            }
        }
        Expr::And(left, right) => {
            match (extract_time_range(left), extract_time_range(right)) {
                (Some(l), Some(r)) => Some(TimeRange {
                    from_ts: l.from_ts.max(r.from_ts),
                    to_ts: l.to_ts.min(r.to_ts),
                }),
                (Some(l), None) => Some(l),
                (None, Some(r)) => Some(r),
                (None, None) => None,
            }
        }
        _ => None,
    }
}

fn comparison_range(op: CompareOp, v: i64, flipped: bool) -> Option<TimeRange> {
    // With the literal on the left, `v op ts` reads as `ts flipped-op v`
    let op = if flipped {
        match op {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    } else {
        op
    };

    match op {
        CompareOp::Ge => Some(TimeRange {
            from_ts: v,
            to_ts: i64::MAX,
        }),
        CompareOp::Gt => Some(TimeRange {
            from_ts: v.saturating_add(1),
            to_ts: i64::MAX,
        }),
        CompareOp::Le => Some(TimeRange {
            from_ts: i64::MIN,
            to_ts: v,
        }),
        CompareOp::Lt => Some(TimeRange {
            from_ts: i64::MIN,
            to_ts: v.saturating_sub(1),
        }),
        CompareOp::Eq => Some(TimeRange {
            from_ts: v,
            to_ts: v,
        }),
        CompareOp::Ne => None,
    }
}

/// Remove every time-touching predicate from a WHERE tree
///
/// Returns the residual expression, or `None` when the whole tree was a
/// time constraint. Subtrees emptied by removal collapse into their
/// remaining sibling.
pub fn remove_time_constraints(expr: &Expr) -> Option<Expr> {
    match expr {
        Expr::Between { expr: target, .. } if is_timestamp_column(target) => None,
        Expr::Compare { left, right, .. }
            if is_timestamp_column(left) || is_timestamp_column(right) =>
        {
            None
        }
        Expr::And(left, right) => rebuild_binary(left, right, Expr::And),
        Expr::Or(left, right) => rebuild_binary(left, right, Expr::Or),
        other => Some(other.clone()),
    }
}

fn rebuild_binary(
    left: &Expr,
    right: &Expr,
    make: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Option<Expr> {
    match (remove_time_constraints(left), remove_time_constraints(right)) {
        (Some(l), Some(r)) => Some(make(Box::new(l), Box::new(r))),
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

/// Distinct non-timestamp columns referenced by a WHERE tree, in first
/// appearance order. Feeds the adaptive index policy.
pub fn collect_predicate_columns(expr: &Expr) -> Vec<String> {
    let mut columns = Vec::new();
    collect_columns(expr, &mut columns);
    columns
}

fn collect_columns(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::And(left, right) | Expr::Or(left, right) => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::Compare { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::InList { expr, .. }
        | Expr::Between { expr, .. }
        | Expr::LikePrefix { expr, .. } => collect_columns(expr, out),
        Expr::Column(name) => {
            if !is_timestamp_column(expr) && !out.iter().any(|c| c == name) {
                out.push(name.clone());
            }
        }
        Expr::Literal(_) => {}
    }
}
