use core::fmt;
use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::db::{StoreError, StoreResult};

/// A single table row as the store hands it back: column name -> JSON value.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

/// Select query against a single table.
///
/// Mirrors the small subset of a hosted query builder we rely on: column projection, equality
/// filters joined with AND, a single sort key, and a row limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub filters: Vec<(String, Value)>,
    pub order: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(name: &str) -> Self {
        Self {
            table: name.to_string(),
            columns: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Comma-separated column list; `*` (or an empty list) selects everything.
    pub fn select(mut self, columns: &str) -> Self {
        let columns: Vec<String> = columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != "*")
            .map(String::from)
            .collect();

        self.columns = (!columns.is_empty()).then_some(columns);
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn order(mut self, column: &str, order: Order) -> Self {
        self.order = Some((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every identifier the query will splice into a request.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.table.as_str())
            .chain(self.columns.iter().flatten().map(String::as_str))
            .chain(self.filters.iter().map(|(c, _)| c.as_str()))
            .chain(self.order.iter().map(|(c, _)| c.as_str()))
    }
}

#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    async fn select(&self, query: &Query) -> StoreResult<Vec<Row>>;

    /// Inserts `row`, returning the stored representation.
    async fn insert(&self, table: &str, row: Row) -> StoreResult<Vec<Row>>;

    /// Inserts `row` unless a row with the same `on_conflict` value already exists. Returns the
    /// inserted rows, which is empty when the insert was skipped.
    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> StoreResult<Vec<Row>>;
}

/// Rejects anything that isn't a plain `[A-Za-z0-9_]` identifier.
pub fn check_ident(name: &str) -> StoreResult<&str> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Text form of a filter value; strings are taken verbatim rather than JSON-quoted.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Orders two column values the way Postgres does by default: numbers numerically, everything
/// else by text, and NULL sorting after every non-null value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (x, y) => value_as_text(x).cmp(&value_as_text(y)),
    }
}
