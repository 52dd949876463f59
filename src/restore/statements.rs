//! Splits a SQL script into individual statements.
//!
//! Split points are the `;` tokens the PostgreSQL tokenizer reports, so a
//! semicolon inside a string literal, quoted identifier, or comment never
//! ends a statement. Each statement is sliced out of the original text
//! unchanged.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer};

use crate::errors::{AppError, Result};

pub fn split_statements(sql: &str) -> Result<Vec<String>> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| AppError::Tokenize(e.to_string()))?;
    let index = LineIndex::new(sql);

    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_code = false;

    for TokenWithLocation { token, location } in &tokens {
        match token {
            Token::SemiColon => {
                let end = index.offset(location).ok_or_else(|| {
                    AppError::Tokenize(format!(
                        "statement terminator at line {} column {} is out of range",
                        location.line, location.column
                    ))
                })?;
                if has_code {
                    statements.push(clean(&sql[start..end]));
                }
                start = end + 1;
                has_code = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_code = true,
        }
    }
    if has_code {
        statements.push(clean(&sql[start..]));
    }

    Ok(statements)
}

/// Trims whitespace and drops whole-line `--` comments in front of the
/// statement so logs and errors show the statement itself.
fn clean(raw: &str) -> String {
    let mut rest = raw.trim();
    while rest.starts_with("--") {
        rest = match rest.find('\n') {
            Some(newline) => rest[newline + 1..].trim_start(),
            None => "",
        };
    }
    rest.trim_end().to_string()
}

/// Maps the tokenizer's 1-based (line, column-in-chars) positions back to
/// byte offsets.
struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { text, line_starts }
    }

    fn offset(&self, location: &Location) -> Option<usize> {
        let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
        let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
        let line_start = *self.line_starts.get(line)?;
        self.text[line_start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| line_start + i)
    }
}
