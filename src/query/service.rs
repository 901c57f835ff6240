//! Query service
//!
//! The main entry point for SQL execution: parse → plan → execute. Also
//! exposes plan inspection (`explain`), syntax validation, batch
//! execution, and storage introspection for the outer API layers.
//!
//! When an [`IndexManager`] is attached, every successfully planned query
//! reports the non-time columns its WHERE clause touches, feeding the
//! adaptive indexing loop.

use crate::index::IndexManager;
use crate::query::ast::Statement;
use crate::query::error::QueryError;
use crate::query::executor::{Executor, QueryResult};
use crate::query::expr::{collect_predicate_columns, Value};
use crate::query::parser;
use crate::query::planner::{self, PhysicalPlan, QueryRequest};
use crate::storage::{ColumnStore, StoreStats};
use std::sync::Arc;

/// Orchestrates the query pipeline
pub struct QueryService {
    store: Arc<ColumnStore>,
    executor: Executor,
    index: Option<Arc<IndexManager>>,
}

impl QueryService {
    pub fn new(store: Arc<ColumnStore>) -> Self {
        Self {
            executor: Executor::new(Arc::clone(&store)),
            store,
            index: None,
        }
    }

    /// Attach an index manager so planned predicates feed the adaptive loop
    pub fn with_index_manager(store: Arc<ColumnStore>, index: Arc<IndexManager>) -> Self {
        Self {
            executor: Executor::new(Arc::clone(&store)),
            store,
            index: Some(index),
        }
    }

    /// Execute a query request
    pub fn execute(&self, request: &QueryRequest) -> Result<QueryResult, QueryError> {
        let statement = self.parse_request(request)?;
        let plan = planner::plan(&statement, request)?;
        self.observe_predicates(&statement);

        tracing::debug!(sql = %request.sql, "executing query");
        self.executor.execute(&plan)
    }

    /// Execute a bare SQL string
    pub fn execute_sql(&self, sql: &str) -> Result<QueryResult, QueryError> {
        self.execute(&QueryRequest::new(sql))
    }

    /// Execute several requests in sequence
    ///
    /// A failed query becomes a single-column `error` result instead of
    /// aborting the batch.
    pub fn execute_many(&self, requests: &[QueryRequest]) -> Vec<QueryResult> {
        requests
            .iter()
            .map(|request| match self.execute(request) {
                Ok(result) => result,
                Err(e) => QueryResult {
                    columns: vec!["error".to_string()],
                    rows: vec![vec![Value::Str(e.to_string())]],
                    scanned_rows: 0,
                    matched_rows: 0,
                    elapsed_millis: 0,
                },
            })
            .collect()
    }

    /// Plan a request without executing it
    pub fn explain(&self, request: &QueryRequest) -> Result<PhysicalPlan, QueryError> {
        let statement = self.parse_request(request)?;
        planner::plan(&statement, request)
    }

    /// Check SQL syntax without planning or executing
    pub fn validate_sql(&self, sql: &str) -> Result<(), QueryError> {
        if sql.trim().is_empty() {
            return Err(QueryError::parse("empty query", 1, 1));
        }
        parser::parse(sql).map(|_| ())
    }

    fn parse_request(&self, request: &QueryRequest) -> Result<Statement, QueryError> {
        if request.sql.trim().is_empty() {
            return Err(QueryError::parse("empty query", 1, 1));
        }
        parser::parse(&request.sql)
    }

    /// Report WHERE-clause columns to the adaptive policy
    fn observe_predicates(&self, statement: &Statement) {
        let Some(index) = &self.index else { return };
        let Statement::Select(select) = statement;
        let Some(where_clause) = &select.where_clause else {
            return;
        };

        for column in collect_predicate_columns(where_clause) {
            index.record_query_usage(&select.table, &column);
        }
    }

    /// Names of tables that currently hold events
    pub fn table_names(&self) -> Vec<String> {
        self.store.table_names()
    }

    /// Whether a table currently holds events
    pub fn table_exists(&self, table: &str) -> bool {
        self.store.table_names().iter().any(|t| t == table)
    }

    /// Total events across all tables
    pub fn total_event_count(&self) -> u64 {
        self.store.size()
    }

    /// Storage statistics
    pub fn storage_stats(&self) -> StoreStats {
        self.store.stats()
    }
}
