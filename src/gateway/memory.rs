//! In-process datastore for exercising jobs without a database server.
//! Understands the single-row `INSERT INTO t VALUES (...)` statements the
//! manual exporter writes, and nothing else.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use super::{DataStore, Session, SqlValue, TableSnapshot};
use crate::errors::{AppError, Result};

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Vec<TableSnapshot>>>,
    unreachable: bool,
}

impl MemoryStore {
    pub fn with_tables(names: &[&str]) -> Self {
        let store = MemoryStore::default();
        for name in names {
            store.lock().push(TableSnapshot {
                name: name.to_string(),
                rows: Vec::new(),
            });
        }
        store
    }

    /// A store whose `acquire` always fails.
    pub fn unreachable() -> Self {
        MemoryStore {
            unreachable: true,
            ..MemoryStore::default()
        }
    }

    pub fn insert_row(&self, table: &str, row: Vec<SqlValue>) {
        let mut tables = self.lock();
        if let Some(snapshot) = tables.iter_mut().find(|t| t.name == table) {
            snapshot.rows.push(row);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.lock()
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TableSnapshot>> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn acquire(&self) -> Result<Box<dyn Session>> {
        if self.unreachable {
            return Err(AppError::Datastore(
                "connection refused (memory store is unreachable)".to_string(),
            ));
        }
        Ok(Box::new(MemorySession {
            store: self.clone(),
            open: true,
        }))
    }
}

struct MemorySession {
    store: MemoryStore,
    open: bool,
}

impl MemorySession {
    fn store(&self) -> Result<&MemoryStore> {
        if self.open {
            Ok(&self.store)
        } else {
            Err(AppError::Datastore("connection already closed".to_string()))
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.store()?.lock().iter().map(|t| t.name.clone()).collect())
    }

    async fn fetch_table(&mut self, table: &str) -> Result<TableSnapshot> {
        self.store()?
            .lock()
            .iter()
            .find(|t| t.name == table)
            .cloned()
            .ok_or_else(|| AppError::Datastore(format!("relation \"{}\" does not exist", table)))
    }

    async fn execute(&mut self, statement: &str) -> Result<u64> {
        let (table, row) = parse_insert(statement)?;
        let store = self.store()?;
        let mut tables = store.lock();
        let snapshot = tables
            .iter_mut()
            .find(|t| t.name == table)
            .ok_or_else(|| AppError::Datastore(format!("relation \"{}\" does not exist", table)))?;
        snapshot.rows.push(row);
        Ok(1)
    }

    async fn clear_tables(&mut self, tables: &[String]) -> Result<()> {
        let store = self.store()?;
        for snapshot in store.lock().iter_mut() {
            if tables.contains(&snapshot.name) {
                snapshot.rows.clear();
            }
        }
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        Ok(self.fetch_table(table).await?.rows.len() as u64)
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

fn syntax_error(statement: &str, expected: &str) -> AppError {
    AppError::Datastore(format!("syntax error: expected {} in `{}`", expected, statement))
}

fn parse_insert(statement: &str) -> Result<(String, Vec<SqlValue>)> {
    let dialect = PostgreSqlDialect {};
    let tokens: Vec<Token> = Tokenizer::new(&dialect, statement)
        .tokenize()
        .map_err(|e| AppError::Datastore(format!("syntax error: {}", e)))?
        .into_iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect();
    let mut tokens = tokens.into_iter().peekable();

    for keyword in ["INSERT", "INTO"] {
        match tokens.next() {
            Some(Token::Word(w)) if w.value.eq_ignore_ascii_case(keyword) => {}
            _ => return Err(syntax_error(statement, keyword)),
        }
    }
    let table = match tokens.next() {
        Some(Token::Word(w)) => w.value,
        _ => return Err(syntax_error(statement, "table name")),
    };
    match tokens.next() {
        Some(Token::Word(w)) if w.value.eq_ignore_ascii_case("VALUES") => {}
        _ => return Err(syntax_error(statement, "VALUES")),
    }
    if tokens.next() != Some(Token::LParen) {
        return Err(syntax_error(statement, "("));
    }

    let mut row = Vec::new();
    loop {
        let value = match tokens.next() {
            Some(Token::SingleQuotedString(s)) => SqlValue::Text(s),
            Some(Token::Number(n, _)) => SqlValue::Literal(n),
            Some(Token::Minus) => match tokens.next() {
                Some(Token::Number(n, _)) => SqlValue::Literal(format!("-{}", n)),
                _ => return Err(syntax_error(statement, "number")),
            },
            Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case("NULL") => {
                SqlValue::Null
            }
            Some(Token::Word(w))
                if w.quote_style.is_none()
                    && (w.value.eq_ignore_ascii_case("TRUE") || w.value.eq_ignore_ascii_case("FALSE")) =>
            {
                SqlValue::Literal(w.value.to_lowercase())
            }
            _ => return Err(syntax_error(statement, "value")),
        };
        row.push(value);

        match tokens.next() {
            Some(Token::Comma) => continue,
            Some(Token::RParen) => break,
            _ => return Err(syntax_error(statement, ")")),
        }
    }

    if tokens.next().is_some() {
        return Err(syntax_error(statement, "end of statement"));
    }
    Ok((table, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insert_values() -> anyhow::Result<()> {
        let (table, row) = parse_insert("INSERT INTO buildings VALUES (1, 'O''Brien', NULL, -2.5, true)")?;

        assert_eq!(table, "buildings");
        assert_eq!(
            row,
            vec![
                SqlValue::Literal("1".into()),
                SqlValue::Text("O'Brien".into()),
                SqlValue::Null,
                SqlValue::Literal("-2.5".into()),
                SqlValue::Literal("true".into()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_parse_insert_missing_paren() {
        let err = parse_insert("INSERT INTO buildings VALUES (2, 'B', NULL").unwrap_err();
        assert!(err.to_string().contains("syntax error"));
    }

    #[tokio::test]
    async fn test_execute_unknown_table() -> anyhow::Result<()> {
        let store = MemoryStore::with_tables(&["buildings"]);
        let mut session = store.acquire().await?;

        let err = session.execute("INSERT INTO leases VALUES (1)").await.unwrap_err();
        assert!(err.to_string().contains("leases"));
        Ok(())
    }
}
