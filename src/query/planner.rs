//! Query planner
//!
//! Converts a parsed [`Statement`] into a [`PhysicalPlan`]: an ordered
//! operator pipeline `Scan → [Aggregate] → Project → [OrderBy] → [Limit]`.
//! Planning extracts the time window from the WHERE clause so the scan can
//! skip rows by timestamp, leaving the residual predicate for row-level
//! filtering, and validates the aggregate/group-by pairing.

use crate::query::ast::{AggFunc, Expr, OrderItem, Select, SelectItem, Statement};
use crate::query::error::QueryError;
use crate::query::expr::{extract_time_range, remove_time_constraints, TimeRange};
use std::fmt;

/// A query request: SQL plus execution hints
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// The SQL text to execute
    pub sql: String,
    /// Optional cap on the result size; the effective limit is
    /// `min(sql_limit, limit_hint)` when both are present
    pub limit_hint: Option<usize>,
    /// Reserved for a future vectorized execution mode
    pub vectorized: bool,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            limit_hint: None,
            vectorized: false,
        }
    }

    pub fn with_limit_hint(mut self, limit_hint: usize) -> Self {
        self.limit_hint = Some(limit_hint);
        self
    }
}

/// Aggregate output specification
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    pub func: AggFunc,
    /// `None` for `COUNT(*)`
    pub column: Option<String>,
    pub alias: String,
}

/// Projection specification; `column == "*"` splices the full column set
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSpec {
    pub column: String,
    pub alias: String,
}

/// A physical operator
#[derive(Debug, Clone)]
pub enum Operator {
    Scan {
        table: String,
        from_ts: i64,
        to_ts: i64,
        predicate: Option<Expr>,
    },
    Aggregate {
        group_by: Vec<String>,
        aggregates: Vec<AggregateSpec>,
    },
    Project {
        projections: Vec<ProjectionSpec>,
    },
    OrderBy {
        items: Vec<OrderItem>,
    },
    Limit {
        limit: usize,
    },
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan {
                table,
                from_ts,
                to_ts,
                predicate,
            } => write!(
                f,
                "Scan(table={}, from_ts={}, to_ts={}, predicate={})",
                table,
                from_ts,
                to_ts,
                predicate
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "none".into())
            ),
            Self::Aggregate {
                group_by,
                aggregates,
            } => {
                let aggs: Vec<String> = aggregates
                    .iter()
                    .map(|a| format!("{} AS {}", a.func.default_alias(a.column.as_deref()), a.alias))
                    .collect();
                write!(
                    f,
                    "Aggregate(group_by=[{}], aggregates=[{}])",
                    group_by.join(", "),
                    aggs.join(", ")
                )
            }
            Self::Project { projections } => {
                let cols: Vec<String> = projections
                    .iter()
                    .map(|p| {
                        if p.alias == p.column {
                            p.column.clone()
                        } else {
                            format!("{} AS {}", p.column, p.alias)
                        }
                    })
                    .collect();
                write!(f, "Project({})", cols.join(", "))
            }
            Self::OrderBy { items } => {
                let keys: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "OrderBy({})", keys.join(", "))
            }
            Self::Limit { limit } => write!(f, "Limit({})", limit),
        }
    }
}

/// An ordered operator pipeline
#[derive(Debug, Clone)]
pub struct PhysicalPlan {
    pub operators: Vec<Operator>,
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PhysicalPlan:")?;
        for (i, op) in self.operators.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, op)?;
        }
        Ok(())
    }
}

impl PhysicalPlan {
    /// The table the plan scans
    pub fn table(&self) -> &str {
        match &self.operators[0] {
            Operator::Scan { table, .. } => table,
            _ => unreachable!("plans always start with a scan"),
        }
    }
}

/// Plan a statement into a physical pipeline
pub fn plan(statement: &Statement, request: &QueryRequest) -> Result<PhysicalPlan, QueryError> {
    let Statement::Select(select) = statement;
    plan_select(select, request)
}

fn plan_select(select: &Select, request: &QueryRequest) -> Result<PhysicalPlan, QueryError> {
    validate(select)?;

    // Time-range pushdown: extract the window, keep the rest for row filtering
    let (range, residual) = match &select.where_clause {
        Some(where_clause) => (
            extract_time_range(where_clause).unwrap_or_else(TimeRange::unbounded),
            remove_time_constraints(where_clause),
        ),
        None => (TimeRange::unbounded(), None),
    };

    let mut operators = vec![Operator::Scan {
        table: select.table.clone(),
        from_ts: range.from_ts,
        to_ts: range.to_ts,
        predicate: residual,
    }];

    let aggregates = aggregate_specs(&select.items);
    if !aggregates.is_empty() {
        operators.push(Operator::Aggregate {
            group_by: select.group_by.clone(),
            aggregates,
        });
    }

    operators.push(Operator::Project {
        projections: projection_specs(&select.items),
    });

    if !select.order_by.is_empty() {
        operators.push(Operator::OrderBy {
            items: select.order_by.clone(),
        });
    }

    let limit = match (select.limit, request.limit_hint) {
        (Some(l), Some(h)) => Some(l.min(h)),
        (Some(l), None) => Some(l),
        (None, Some(h)) => Some(h),
        (None, None) => None,
    };
    if let Some(limit) = limit {
        operators.push(Operator::Limit { limit });
    }

    Ok(PhysicalPlan { operators })
}

fn validate(select: &Select) -> Result<(), QueryError> {
    if select.table.trim().is_empty() {
        return Err(QueryError::plan("missing table name"));
    }
    if select.items.is_empty() {
        return Err(QueryError::plan("empty SELECT list"));
    }

    let has_aggregates = select.items.iter().any(SelectItem::is_aggregate);
    let has_group_by = !select.group_by.is_empty();

    if has_aggregates && !has_group_by {
        return Err(QueryError::plan(
            "aggregate functions require a GROUP BY clause",
        ));
    }
    if has_group_by && !has_aggregates {
        return Err(QueryError::plan(
            "GROUP BY requires aggregate functions in the SELECT list",
        ));
    }

    Ok(())
}

fn aggregate_specs(items: &[SelectItem]) -> Vec<AggregateSpec> {
    items
        .iter()
        .filter_map(|item| match item {
            SelectItem::Aggregate {
                func,
                column,
                alias,
            } => Some(AggregateSpec {
                func: *func,
                column: column.clone(),
                alias: alias
                    .clone()
                    .unwrap_or_else(|| func.default_alias(column.as_deref())),
            }),
            _ => None,
        })
        .collect()
}

fn projection_specs(items: &[SelectItem]) -> Vec<ProjectionSpec> {
    items
        .iter()
        .map(|item| match item {
            SelectItem::Star => ProjectionSpec {
                column: "*".into(),
                alias: "*".into(),
            },
            SelectItem::Column { name, alias } => ProjectionSpec {
                column: name.clone(),
                alias: alias.clone().unwrap_or_else(|| name.clone()),
            },
            SelectItem::Aggregate {
                func,
                column,
                alias,
            } => {
                // Aggregates are referenced by their output alias
                let alias = alias
                    .clone()
                    .unwrap_or_else(|| func.default_alias(column.as_deref()));
                ProjectionSpec {
                    column: alias.clone(),
                    alias,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;

    fn plan_sql(sql: &str) -> Result<PhysicalPlan, QueryError> {
        let statement = parse(sql)?;
        plan(&statement, &QueryRequest::new(sql))
    }

    #[test]
    fn test_plan_simple_select() {
        let plan = plan_sql("SELECT userId FROM events WHERE userId = 'u1'").unwrap();
        assert_eq!(plan.operators.len(), 2);
        assert!(matches!(plan.operators[0], Operator::Scan { .. }));
        assert!(matches!(plan.operators[1], Operator::Project { .. }));
        assert_eq!(plan.table(), "events");
    }

    #[test]
    fn test_plan_full_pipeline() {
        let plan = plan_sql(
            "SELECT region, COUNT(*) AS c FROM events \
             WHERE ts >= 1000 GROUP BY region ORDER BY c DESC LIMIT 5",
        )
        .unwrap();

        assert_eq!(plan.operators.len(), 5);
        assert!(matches!(plan.operators[0], Operator::Scan { .. }));
        assert!(matches!(plan.operators[1], Operator::Aggregate { .. }));
        assert!(matches!(plan.operators[2], Operator::Project { .. }));
        assert!(matches!(plan.operators[3], Operator::OrderBy { .. }));
        assert!(matches!(plan.operators[4], Operator::Limit { limit: 5 }));
    }

    #[test]
    fn test_plan_pushdown() {
        let plan =
            plan_sql("SELECT userId FROM events WHERE ts BETWEEN 1500 AND 3500 AND userId = 'u1'")
                .unwrap();

        match &plan.operators[0] {
            Operator::Scan {
                from_ts,
                to_ts,
                predicate,
                ..
            } => {
                assert_eq!(*from_ts, 1500);
                assert_eq!(*to_ts, 3500);
                let residual = predicate.as_ref().unwrap();
                assert_eq!(residual.to_string(), "(userId = 'u1')");
            }
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_pushdown_removes_entire_predicate() {
        let plan = plan_sql("SELECT userId FROM events WHERE ts >= 1000").unwrap();
        match &plan.operators[0] {
            Operator::Scan {
                from_ts, predicate, ..
            } => {
                assert_eq!(*from_ts, 1000);
                assert!(predicate.is_none());
            }
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_or_keeps_predicate() {
        let plan =
            plan_sql("SELECT userId FROM events WHERE ts >= 1000 OR userId = 'u1'").unwrap();
        match &plan.operators[0] {
            Operator::Scan {
                from_ts,
                to_ts,
                predicate,
                ..
            } => {
                assert_eq!(*from_ts, i64::MIN);
                assert_eq!(*to_ts, i64::MAX);
                assert!(predicate.is_some());
            }
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_aggregate_without_group_by_fails() {
        let err = plan_sql("SELECT COUNT(*) FROM events").unwrap_err();
        assert!(err.is_plan());
    }

    #[test]
    fn test_plan_group_by_without_aggregate_fails() {
        let err = plan_sql("SELECT userId FROM events GROUP BY userId").unwrap_err();
        assert!(err.is_plan());
    }

    #[test]
    fn test_plan_default_aggregate_alias() {
        let plan = plan_sql("SELECT region, SUM(price) FROM events GROUP BY region").unwrap();
        match &plan.operators[1] {
            Operator::Aggregate { aggregates, .. } => {
                assert_eq!(aggregates[0].alias, "SUM(price)");
            }
            other => panic!("expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_limit_hint_resolution() {
        let statement = parse("SELECT * FROM events LIMIT 10").unwrap();
        let plan1 = plan(
            &statement,
            &QueryRequest::new("...").with_limit_hint(2),
        )
        .unwrap();
        assert!(matches!(
            plan1.operators.last(),
            Some(Operator::Limit { limit: 2 })
        ));

        let statement = parse("SELECT * FROM events").unwrap();
        let plan2 = plan(
            &statement,
            &QueryRequest::new("...").with_limit_hint(7),
        )
        .unwrap();
        assert!(matches!(
            plan2.operators.last(),
            Some(Operator::Limit { limit: 7 })
        ));

        let statement = parse("SELECT * FROM events LIMIT 3").unwrap();
        let plan3 = plan(&statement, &QueryRequest::new("...")).unwrap();
        assert!(matches!(
            plan3.operators.last(),
            Some(Operator::Limit { limit: 3 })
        ));
    }
}
