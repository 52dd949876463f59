use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Backup operation failed: {0}")]
    Backup(String),

    #[error("Restore operation failed: {0}")]
    Restore(String),

    #[error("Connection to {target} timed out after {seconds}s")]
    ConnectTimeout { target: String, seconds: u64 },

    #[error("{tool} executable not found in PATH")]
    ToolNotFound {
        tool: String,
        #[source]
        source: which::Error,
    },

    #[error("{tool} exited with status {code}")]
    ToolExit { tool: String, code: i32 },

    #[error("Could not tokenize SQL: {0}")]
    Tokenize(String),

    #[error("Statement {index} failed: {message}")]
    Statement { index: usize, message: String },

    #[error("Datastore error: {0}")]
    Datastore(String),

    #[error("A backup or restore job is already running")]
    Busy,

    #[error("{0}")]
    JobFailed(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
