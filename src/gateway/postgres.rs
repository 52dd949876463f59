// pm-backup/src/gateway/postgres.rs
use async_trait::async_trait;
use sqlx::{Connection, PgConnection, Row};
use tokio::time::timeout;
use tracing::{debug, info};

use super::{DataStore, Session, SqlValue, TableSnapshot};
use crate::config::DbConfig;
use crate::errors::{AppError, Result};
use crate::utils::{quote_ident, sequence_reset};

/// Column types whose `::text` form can be written back unquoted.
const LITERAL_TYPES: &[&str] = &[
    "smallint",
    "integer",
    "bigint",
    "numeric",
    "real",
    "double precision",
    "boolean",
];

pub struct PgDataStore {
    config: DbConfig,
}

impl PgDataStore {
    pub fn new(config: DbConfig) -> Self {
        PgDataStore { config }
    }
}

#[async_trait]
impl DataStore for PgDataStore {
    async fn acquire(&self) -> Result<Box<dyn Session>> {
        let url = self.config.connection_url()?;
        let target = self.config.redacted_url();
        debug!(target = %target, "Opening database connection");

        let conn = timeout(self.config.connect_timeout(), PgConnection::connect(url.as_str()))
            .await
            .map_err(|_| AppError::ConnectTimeout {
                target: target.clone(),
                seconds: self.config.connect_timeout_secs,
            })??;

        info!(target = %target, "Connected");
        Ok(Box::new(PgSession { conn: Some(conn) }))
    }
}

struct PgSession {
    conn: Option<PgConnection>,
}

impl PgSession {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::Datastore("connection already closed".to_string()))
    }
}

#[async_trait]
impl Session for PgSession {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(tables)
    }

    async fn fetch_table(&mut self, table: &str) -> Result<TableSnapshot> {
        let conn = self.conn()?;
        let columns: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name::text, data_type::text
             FROM information_schema.columns
             WHERE table_schema = 'public' AND table_name = $1
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;

        if columns.is_empty() {
            return Ok(TableSnapshot {
                name: table.to_string(),
                rows: Vec::new(),
            });
        }

        let select_list = columns
            .iter()
            .map(|(name, _)| format!("{}::text", quote_ident(name)))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!("SELECT {} FROM {}", select_list, quote_ident(table));

        let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;
        let mut snapshot_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for (index, (_, data_type)) in columns.iter().enumerate() {
                let raw: Option<String> = row.try_get(index)?;
                values.push(classify(data_type, raw));
            }
            snapshot_rows.push(values);
        }

        Ok(TableSnapshot {
            name: table.to_string(),
            rows: snapshot_rows,
        })
    }

    async fn execute(&mut self, statement: &str) -> Result<u64> {
        let conn = self.conn()?;
        let result = sqlx::query(statement)
            .persistent(false)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear_tables(&mut self, tables: &[String]) -> Result<()> {
        if tables.is_empty() {
            return Ok(());
        }
        let conn = self.conn()?;
        let list = tables
            .iter()
            .map(|t| quote_ident(t))
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", list))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&mut *conn)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn reset_sequences(&mut self) -> Result<usize> {
        let conn = self.conn()?;
        sequence_reset::reset_all_sequences(conn).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            debug!("Database connection closed");
        }
        Ok(())
    }
}

/// Maps a `::text` column value onto the dump value model.
fn classify(data_type: &str, raw: Option<String>) -> SqlValue {
    match raw {
        None => SqlValue::Null,
        Some(text) if LITERAL_TYPES.contains(&data_type) && is_plain_literal(&text) => {
            SqlValue::Literal(text)
        }
        Some(text) => SqlValue::Text(text),
    }
}

/// Numbers and booleans only; `NaN` and `Infinity` need quoting.
fn is_plain_literal(text: &str) -> bool {
    text == "true"
        || text == "false"
        || (text.chars().any(|c| c.is_ascii_digit())
            && text
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')))
}
