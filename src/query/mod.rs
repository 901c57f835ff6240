//! Eventide query engine
//!
//! A restricted SQL dialect over the column store:
//!
//! - **ast**: statement and expression types
//! - **parser**: nom-based parser (case-insensitive, `--` comments)
//! - **expr**: value model, coercion, predicate evaluation, time pushdown
//! - **planner**: AST → physical operator pipeline
//! - **executor**: tuple-at-a-time operator execution
//! - **service**: parse → plan → execute orchestration
//! - **error**: the parse / plan / execution failure taxonomy
//!
//! # Dialect
//!
//! ```text
//! SELECT select_list FROM table
//!   [WHERE expr]
//!   [GROUP BY ident (, ident)*]
//!   [ORDER BY ident [ASC|DESC] (, ...)*]
//!   [LIMIT n]
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let service = QueryService::new(store);
//! let result = service.execute_sql(
//!     "SELECT region, COUNT(*) AS c FROM events GROUP BY region ORDER BY c DESC",
//! )?;
//! ```

pub mod ast;
pub mod error;
pub mod executor;
pub mod expr;
pub mod parser;
pub mod planner;
pub mod service;

pub use ast::{AggFunc, CompareOp, Expr, Literal, OrderItem, Select, SelectItem, Statement};
pub use error::QueryError;
pub use executor::{Executor, QueryResult};
pub use expr::{TimeRange, Value};
pub use parser::parse;
pub use planner::{AggregateSpec, Operator, PhysicalPlan, ProjectionSpec, QueryRequest};
pub use service::QueryService;
