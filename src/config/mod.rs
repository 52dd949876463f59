// pm-backup/src/config/mod.rs
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::errors::Result;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "property_manager";
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BACKUP_DIR: &str = "./backups";
pub const DEFAULT_DUMP_TOOL: &str = "pg_dump";
pub const DEFAULT_RESTORE_TOOL: &str = "psql";

/// Connection parameters for the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub connect_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            name: DEFAULT_DATABASE.to_string(),
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl DbConfig {
    /// Full `postgres://` URL including the password.
    pub fn connection_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("postgres://{}:{}/", self.host, self.port))?;
        url.set_path(&self.name);
        // set_username/set_password only fail for cannot-be-a-base URLs
        let _ = url.set_username(&self.user);
        if !self.password.is_empty() {
            let _ = url.set_password(Some(&self.password));
        }
        Ok(url)
    }

    /// Connection URL safe for logs.
    pub fn redacted_url(&self) -> String {
        match self.connection_url() {
            Ok(mut url) => {
                let _ = url.set_password(None);
                url.to_string()
            }
            Err(_) => format!("{}:{}/{}", self.host, self.port, self.name),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub backup_dir: PathBuf,
    pub dump_tool: String,
    pub restore_tool: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db: DbConfig::default(),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            dump_tool: DEFAULT_DUMP_TOOL.to_string(),
            restore_tool: DEFAULT_RESTORE_TOOL.to_string(),
        }
    }
}

impl AppConfig {
    /// Resolves configuration from an optional properties file.
    ///
    /// A missing or unreadable file is not an error: every key falls back to
    /// its default. The result is meant to be built once at startup and
    /// handed to whoever needs it.
    pub fn load(config_path: &Path) -> Self {
        match fs::read_to_string(config_path) {
            Ok(content) => {
                info!(path = %config_path.display(), "Loaded configuration file");
                Self::from_properties(&parse_properties(&content))
            }
            Err(e) => {
                info!(
                    path = %config_path.display(),
                    error = %e,
                    "Configuration file not readable, using defaults"
                );
                AppConfig::default()
            }
        }
    }

    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        let mut config = AppConfig::default();

        for (key, value) in props {
            match key.as_str() {
                "db.host" => config.db.host = value.clone(),
                "db.port" => {
                    if let Some(port) = parse_number(key, value) {
                        config.db.port = port;
                    }
                }
                "db.name" => config.db.name = value.clone(),
                "db.user" => config.db.user = value.clone(),
                "db.password" => config.db.password = value.clone(),
                "db.connect_timeout_secs" => {
                    if let Some(secs) = parse_number(key, value) {
                        config.db.connect_timeout_secs = secs;
                    }
                }
                "backup.dir" if !value.is_empty() => config.backup_dir = PathBuf::from(value),
                "backup.dump_tool" if !value.is_empty() => config.dump_tool = value.clone(),
                "backup.restore_tool" if !value.is_empty() => config.restore_tool = value.clone(),
                _ => debug!(key = %key, "Ignoring unknown configuration key"),
            }
        }

        config
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key = %key, value = %value, "Invalid numeric value in configuration, keeping default");
            None
        }
    }
}

/// Parses `key=value` / `key: value` lines. Lines starting with `#` or `!`
/// are comments; the first separator wins so values may contain `=`.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split_at = line.find(['=', ':'])?;
            let key = line[..split_at].trim();
            let value = line[split_at + 1..].trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}
