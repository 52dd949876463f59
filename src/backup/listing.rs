use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use walkdir::WalkDir;

use super::{BACKUP_FILE_PREFIX, BACKUP_TIMESTAMP_FORMAT};
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub size_kb: u64,
    pub modified: DateTime<Local>,
    /// Parsed from the file name when it follows the backup naming scheme.
    pub created_at: Option<NaiveDateTime>,
}

/// All `*.sql` files directly inside `dir`, newest first. A directory that
/// does not exist yet simply has no backups.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() || !has_sql_extension(entry.path()) {
            continue;
        }

        let metadata = entry.metadata().map_err(io::Error::from)?;
        let name = entry.file_name().to_string_lossy().to_string();
        entries.push(BackupEntry {
            created_at: parse_backup_timestamp(&name),
            path: entry.path().to_path_buf(),
            size_bytes: metadata.len(),
            size_kb: metadata.len() / 1024,
            modified: DateTime::<Local>::from(metadata.modified()?),
            name,
        });
    }

    entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(entries)
}

fn has_sql_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}

/// `property_manager_backup_2024-03-01_14-05-09.sql` → 2024-03-01 14:05:09.
/// A `_N` counter after the timestamp (same-second backups) is ignored.
pub fn parse_backup_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(BACKUP_FILE_PREFIX)?
        .strip_suffix(".sql")?;
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            let (base, counter) = stamp.rsplit_once('_')?;
            if counter.is_empty() || !counter.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            NaiveDateTime::parse_from_str(base, BACKUP_TIMESTAMP_FORMAT).ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    #[test]
    fn test_parse_backup_timestamp() {
        let parsed = parse_backup_timestamp("property_manager_backup_2024-03-01_14-05-09.sql");
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(14, 5, 9));

        assert_eq!(parsed, expected);
        assert_eq!(parse_backup_timestamp("manual_export.sql"), None);
        assert_eq!(parse_backup_timestamp("property_manager_backup_yesterday.sql"), None);
        assert_eq!(
            parse_backup_timestamp("property_manager_backup_2024-03-01_14-05-09_2.sql"),
            expected
        );
        assert_eq!(parse_backup_timestamp("property_manager_backup_2024-03-01_14-05-09_x.sql"), None);
    }

    #[test]
    fn test_list_backups_missing_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(list_backups(&dir.path().join("not-created"))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_backups_only_sql_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("property_manager_backup_2024-03-01_14-05-09.sql"), vec![b'x'; 3072])?;
        fs::write(dir.path().join("legacy.SQL"), b"-- Table: buyers\n")?;
        fs::write(dir.path().join("notes.txt"), b"not a backup")?;
        fs::create_dir(dir.path().join("nested.sql"))?;

        let entries = list_backups(dir.path())?;
        let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["legacy.SQL", "property_manager_backup_2024-03-01_14-05-09.sql"]);

        let dated = entries
            .iter()
            .find(|e| e.created_at.is_some())
            .ok_or_else(|| anyhow::anyhow!("timestamped backup missing"))?;
        assert_eq!(dated.size_bytes, 3072);
        assert_eq!(dated.size_kb, 3);
        Ok(())
    }
}
