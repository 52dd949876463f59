pub mod sequence_reset;

use std::path::PathBuf;

use which::which;

use crate::errors::{AppError, Result};

/// Finds a PostgreSQL client tool (pg_dump, psql, ...) in the system PATH.
pub fn find_executable(tool: &str) -> Result<PathBuf> {
    which(tool).map_err(|source| AppError::ToolNotFound {
        tool: tool.to_string(),
        source,
    })
}

/// Always-quoted identifier, `"` doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Bare identifier when it is already lowercase and plain, quoted otherwise.
pub fn sql_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if plain {
        name.to_string()
    } else {
        quote_ident(name)
    }
}
