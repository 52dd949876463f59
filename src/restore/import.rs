// pm-backup/src/restore/import.rs
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::statements::split_statements;
use crate::errors::{AppError, Result};
use crate::gateway::Session;

/// Longest statement prefix quoted in error messages.
const PREVIEW_CHARS: usize = 120;

/// Reads a dump file and replays it statement by statement.
pub async fn replay_file(
    session: &mut dyn Session,
    sql_file_path: &Path,
    on_statement: impl FnMut(usize, usize),
) -> Result<usize> {
    let sql = fs::read_to_string(sql_file_path).map_err(|e| {
        AppError::Restore(format!("Cannot read {}: {}", sql_file_path.display(), e))
    })?;
    replay(session, &sql, on_statement).await
}

/// Executes each statement on its own, stopping at the first failure.
///
/// There is no enclosing transaction: statements before the failing one
/// stay applied. `on_statement` receives `(executed, total)`.
pub async fn replay(
    session: &mut dyn Session,
    sql: &str,
    mut on_statement: impl FnMut(usize, usize),
) -> Result<usize> {
    let statements = split_statements(sql)?;
    let total = statements.len();
    info!(statements = total, "Replaying SQL statements");

    for (index, statement) in statements.iter().enumerate() {
        session
            .execute(statement)
            .await
            .map_err(|e| AppError::Statement {
                index: index + 1,
                message: format!("{} (in `{}`)", e, preview(statement)),
            })?;
        debug!(statement = index + 1, "Executed");
        on_statement(index + 1, total);
    }

    Ok(total)
}

fn preview(statement: &str) -> String {
    let mut chars = statement.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryStore;
    use crate::gateway::{DataStore, SqlValue};

    #[tokio::test]
    async fn test_replay_restores_quotes_and_nulls() -> anyhow::Result<()> {
        let store = MemoryStore::with_tables(&["buyers"]);
        let mut session = store.acquire().await?;

        let executed = replay(
            session.as_mut(),
            "-- Table: buyers\nINSERT INTO buyers VALUES (1, 'O''Brien', NULL);\n",
            |_, _| {},
        )
        .await?;

        assert_eq!(executed, 1);
        assert_eq!(
            store.rows("buyers"),
            vec![vec![
                SqlValue::Literal("1".into()),
                SqlValue::Text("O'Brien".into()),
                SqlValue::Null,
            ]]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_replay_stops_at_first_bad_statement() -> anyhow::Result<()> {
        let store = MemoryStore::with_tables(&["buildings"]);
        let mut session = store.acquire().await?;
        let mut progress = Vec::new();

        let err = replay(
            session.as_mut(),
            "INSERT INTO buildings VALUES (1, 'A', NULL);\nINSERT INTO buildings VALUES (2, 'B', NULL;\nINSERT INTO buildings VALUES (3, 'C', NULL);",
            |done, total| progress.push((done, total)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Statement { index: 2, .. }));
        assert_eq!(progress, vec![(1, 3)]);
        assert_eq!(store.rows("buildings").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_replay_file_missing() -> anyhow::Result<()> {
        let store = MemoryStore::with_tables(&[]);
        let mut session = store.acquire().await?;

        let err = replay_file(session.as_mut(), Path::new("/nonexistent/dump.sql"), |_, _| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dump.sql"));
        Ok(())
    }

    #[test]
    fn test_preview_truncates_long_statements() {
        let long = "x".repeat(PREVIEW_CHARS + 10);
        assert_eq!(preview(&long).len(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
