//! Access to the relational store.
//!
//! Every operation acquires its own [`Session`] through a [`DataStore`] and
//! closes it before returning. Dropping a session also releases the
//! underlying connection, so early returns cannot leak one.

mod postgres;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::Result;

pub use postgres::PgDataStore;

/// A single column value as it travels through a textual dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    /// Quoted on output.
    Text(String),
    /// Written verbatim (numbers, booleans).
    Literal(String),
}

impl SqlValue {
    /// SQL literal form: `NULL`, `'text'` with `'` doubled, or the raw literal.
    pub fn to_sql(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Text(text) => format!("'{}'", text.replace('\'', "''")),
            SqlValue::Literal(raw) => raw.clone(),
        }
    }
}

/// All rows of one table, in whatever order the store returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub name: String,
    pub rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: u64,
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Opens a fresh connection. Fails when the store is unreachable or
    /// rejects the credentials.
    async fn acquire(&self) -> Result<Box<dyn Session>>;
}

#[async_trait]
pub trait Session: Send {
    /// Base tables visible in the current schema.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    async fn fetch_table(&mut self, table: &str) -> Result<TableSnapshot>;

    /// Runs one statement on its own, returning the affected row count.
    async fn execute(&mut self, statement: &str) -> Result<u64>;

    async fn clear_tables(&mut self, tables: &[String]) -> Result<()>;

    async fn row_count(&mut self, table: &str) -> Result<u64>;

    async fn reset_sequences(&mut self) -> Result<usize> {
        Ok(0)
    }

    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql_literals() {
        assert_eq!(SqlValue::Null.to_sql(), "NULL");
        assert_eq!(SqlValue::Literal("42".into()).to_sql(), "42");
        assert_eq!(SqlValue::Literal("true".into()).to_sql(), "true");
        assert_eq!(SqlValue::Text("A".into()).to_sql(), "'A'");
    }

    #[test]
    fn test_to_sql_doubles_single_quotes() {
        assert_eq!(SqlValue::Text("O'Brien".into()).to_sql(), "'O''Brien'");
        assert_eq!(SqlValue::Text("''".into()).to_sql(), "''''''");
    }

    #[test]
    fn test_text_null_is_not_sql_null() {
        assert_eq!(SqlValue::Text("null".into()).to_sql(), "'null'");
    }
}
