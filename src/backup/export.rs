// pm-backup/src/backup/export.rs
use std::io::Write;

use tracing::debug;

use crate::errors::Result;
use crate::gateway::{Session, SqlValue, TableCount, TableSnapshot};
use crate::utils::sql_identifier;

/// Writes every table as a `-- Table:` comment followed by one INSERT per
/// row, tables in listing order. `on_table` fires after each table with
/// `(tables_done, tables_total, count)`.
pub async fn export_database<W: Write>(
    session: &mut dyn Session,
    out: &mut W,
    mut on_table: impl FnMut(usize, usize, &TableCount),
) -> Result<Vec<TableCount>> {
    let tables = session.list_tables().await?;
    let total = tables.len();
    debug!(tables = total, "Exporting tables");

    let mut counts = Vec::with_capacity(total);
    for (index, table) in tables.iter().enumerate() {
        let snapshot = session.fetch_table(table).await?;
        write_table(out, &snapshot)?;

        let count = TableCount {
            table: snapshot.name,
            rows: snapshot.rows.len() as u64,
        };
        on_table(index + 1, total, &count);
        counts.push(count);
    }

    out.flush()?;
    Ok(counts)
}

pub fn write_table<W: Write>(out: &mut W, snapshot: &TableSnapshot) -> Result<()> {
    writeln!(out, "-- Table: {}", snapshot.name)?;
    let target = sql_identifier(&snapshot.name);
    for row in &snapshot.rows {
        writeln!(out, "{}", insert_statement(&target, row))?;
    }
    writeln!(out)?;
    Ok(())
}

fn insert_statement(target: &str, row: &[SqlValue]) -> String {
    let values = row.iter().map(|v| v.to_sql()).collect::<Vec<_>>().join(", ");
    format!("INSERT INTO {} VALUES ({});", target, values)
}
