// pm-backup/src/utils/sequence_reset.rs
use sqlx::PgConnection;
use tracing::{debug, info, warn};

use super::quote_ident;
use crate::errors::Result;

/// Moves every sequence owned by a `public` table column past the column's
/// current maximum. A data-only replay inserts explicit ids, so without this
/// the next `nextval` would collide with restored rows.
///
/// Individual failures are logged and skipped; returns how many sequences
/// were reset.
pub async fn reset_all_sequences(conn: &mut PgConnection) -> Result<usize> {
    let sequences_query = r#"
        SELECT
            seq.relname as sequence_name,
            tab.relname as table_name,
            attr.attname as column_name
        FROM
            pg_class seq
        JOIN
            pg_depend dep ON dep.objid = seq.oid AND dep.deptype IN ('a', 'i')
        JOIN
            pg_class tab ON dep.refobjid = tab.oid
        JOIN
            pg_attribute attr ON dep.refobjid = attr.attrelid AND dep.refobjsubid = attr.attnum
        JOIN
            pg_namespace nsp ON seq.relnamespace = nsp.oid
        WHERE
            seq.relkind = 'S'
            AND tab.relkind = 'r'
            AND nsp.nspname = 'public'
        ORDER BY
            tab.relname, attr.attname
    "#;

    let sequences = sqlx::query_as::<_, (String, String, String)>(sequences_query)
        .fetch_all(&mut *conn)
        .await?;

    if sequences.is_empty() {
        debug!("No sequences found in public schema");
        return Ok(0);
    }

    let mut reset_count = 0;
    for (sequence_name, table_name, column_name) in sequences {
        let reset_query = format!(
            "SELECT setval('{}', COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
            quote_ident(&sequence_name).replace('\'', "''"),
            quote_ident(&column_name),
            quote_ident(&table_name),
        );

        match sqlx::query(&reset_query).execute(&mut *conn).await {
            Ok(_) => {
                debug!(sequence = %sequence_name, table = %table_name, column = %column_name, "Reset sequence");
                reset_count += 1;
            }
            Err(e) => {
                warn!(sequence = %sequence_name, table = %table_name, error = %e, "Failed to reset sequence");
            }
        }
    }

    info!(count = reset_count, "Sequence reset completed");
    Ok(reset_count)
}
