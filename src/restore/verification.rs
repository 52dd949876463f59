// pm-backup/src/restore/verification.rs
use tracing::{info, warn};

use crate::errors::Result;
use crate::gateway::{Session, TableCount};

/// Counts the rows of every table after a restore.
///
/// An empty table is not an error: a backup taken from an empty database
/// restores into an empty one. The counts end up in the job summary.
pub async fn verify_restore(session: &mut dyn Session) -> Result<Vec<TableCount>> {
    let tables = session.list_tables().await?;
    if tables.is_empty() {
        warn!("No tables found after restore; verification has nothing to check");
        return Ok(Vec::new());
    }

    let mut counts = Vec::with_capacity(tables.len());
    for table in tables {
        let rows = session.row_count(&table).await?;
        info!(table = %table, rows, "Verified table");
        counts.push(TableCount { table, rows });
    }

    let total: u64 = counts.iter().map(|c| c.rows).sum();
    info!(tables = counts.len(), rows = total, "Restore verification completed");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryStore;
    use crate::gateway::{DataStore, SqlValue};

    #[tokio::test]
    async fn test_verify_restore_counts_rows() -> anyhow::Result<()> {
        let store = MemoryStore::with_tables(&["buildings", "buyers"]);
        store.insert_row("buildings", vec![SqlValue::Literal("1".into())]);
        store.insert_row("buildings", vec![SqlValue::Literal("2".into())]);

        let mut session = store.acquire().await?;
        let counts = verify_restore(session.as_mut()).await?;

        assert_eq!(
            counts,
            vec![
                TableCount { table: "buildings".into(), rows: 2 },
                TableCount { table: "buyers".into(), rows: 0 },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_restore_without_tables() -> anyhow::Result<()> {
        let store = MemoryStore::with_tables(&[]);
        let mut session = store.acquire().await?;
        assert!(verify_restore(session.as_mut()).await?.is_empty());
        Ok(())
    }
}
