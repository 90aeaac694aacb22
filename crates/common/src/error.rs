//! Error types for TestPilot

use thiserror::Error;

/// Result type alias using TestPilot Error
pub type Result<T> = std::result::Result<T, Error>;

/// TestPilot error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid report id: {0}")]
    InvalidReportId(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
