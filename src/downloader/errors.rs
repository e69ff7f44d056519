// Error types for the download pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DownloadError>;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Caller-supplied input rejected before orchestration begins
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Output directory could not be materialized
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External tool missing or not executable
    #[error("Failed to start {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External tool finished with a non-zero status
    #[error("{}", exit_message(*code, detail))]
    ProcessExit { code: Option<i32>, detail: String },

    #[error("{program} timed out after {after_ms}ms")]
    Timeout { program: String, after_ms: u128 },

    #[error("Download cancelled")]
    Cancelled,

    /// The process that owned the job went away before it finished
    #[error("Download interrupted before it finished")]
    Interrupted,

    #[error("Job not found: {0}")]
    NotFound(String),

    /// Ledger document unreadable or unwritable
    #[error("Ledger storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn exit_message(code: Option<i32>, detail: &str) -> String {
    let head = match code {
        Some(code) => format!("yt-dlp exited with code {}", code),
        None => "yt-dlp was terminated by a signal".to_string(),
    };
    if detail.is_empty() {
        head
    } else {
        format!("{}: {}", head, detail)
    }
}

impl DownloadError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Stable machine-readable code carried by failed submit results and
    /// persisted on failed job records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DirectoryCreate { .. } => "DIRECTORY_CREATE_ERROR",
            Self::ProcessSpawn { .. } => "PROCESS_SPAWN_ERROR",
            Self::ProcessExit { .. } => "PROCESS_EXIT_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Interrupted => "INTERRUPTED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Storage(_) | Self::Json(_) => "STORAGE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}
