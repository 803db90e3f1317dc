// 🚨 Error Types
// Infrastructure failures (CSV, HTTP, SQLite, config) vs. user-facing validation

use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum ChatbotError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to read records: {0}")]
    Csv(#[from] csv::Error),

    #[error("Record on line {line} is invalid: {reason}")]
    InvalidRecord { line: u64, reason: String },

    #[error("Remote lookup failed: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("Remote lookup returned status {0}")]
    RemoteStatus(u16),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid {key} value: {reason}")]
    Config { key: String, reason: String },

    #[error("Answer for '{0}' is missing")]
    MissingAnswer(String),

    #[error("Action not available while {0}")]
    WrongPhase(String),
}

pub type Result<T> = std::result::Result<T, ChatbotError>;
