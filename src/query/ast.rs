//! Query abstract syntax tree
//!
//! Typed representation of the SQL dialect accepted by Eventide:
//!
//! ```text
//! SELECT select_list FROM table
//!   [WHERE expr]
//!   [GROUP BY ident (, ident)*]
//!   [ORDER BY ident [ASC|DESC] (, ...)*]
//!   [LIMIT n]
//! ```
//!
//! The WHERE grammar covers comparisons, `AND`/`OR`, `IN (...)`,
//! `BETWEEN ... AND ...`, and prefix-only `LIKE 'p%'`.

use std::fmt;

/// A parsed SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
}

/// A SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub items: Vec<SelectItem>,
    pub table: String,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<usize>,
}

/// An item in the SELECT list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Star,
    /// A bare column, optionally aliased
    Column { name: String, alias: Option<String> },
    /// An aggregate call; `column` is `None` for `COUNT(*)`
    Aggregate {
        func: AggFunc,
        column: Option<String>,
        alias: Option<String>,
    },
}

impl SelectItem {
    /// Whether this item is an aggregate call
    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectItem::Aggregate { .. })
    }
}

/// Aggregate functions accepted in the SELECT list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    /// Default output alias, e.g. `COUNT(*)` or `SUM(price)`
    pub fn default_alias(&self, column: Option<&str>) -> String {
        format!("{}({})", self, column.unwrap_or("*"))
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "COUNT"),
            Self::Sum => write!(f, "SUM"),
            Self::Avg => write!(f, "AVG"),
            Self::Min => write!(f, "MIN"),
            Self::Max => write!(f, "MAX"),
        }
    }
}

/// An ORDER BY item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub column: String,
    pub asc: bool,
}

impl fmt::Display for OrderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.column, if self.asc { "ASC" } else { "DESC" })
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{}", symbol)
    }
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "'{}'", v),
        }
    }
}

/// A WHERE expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        values: Vec<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// `expr LIKE 'prefix%'` — only prefix patterns are representable
    LikePrefix {
        expr: Box<Expr>,
        prefix: String,
    },
    Column(String),
    Literal(Literal),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(l, r) => write!(f, "({} AND {})", l, r),
            Self::Or(l, r) => write!(f, "({} OR {})", l, r),
            Self::Compare { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Self::InList { expr, values } => {
                let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} IN ({})", expr, list.join(", "))
            }
            Self::Between { expr, low, high } => {
                write!(f, "{} BETWEEN {} AND {}", expr, low, high)
            }
            Self::LikePrefix { expr, prefix } => write!(f, "{} LIKE '{}%'", expr, prefix),
            Self::Column(name) => write!(f, "{}", name),
            Self::Literal(lit) => write!(f, "{}", lit),
        }
    }
}
