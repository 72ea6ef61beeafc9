//! Finder error types

use std::time::Duration;

use chess_core::RecordError;
use thiserror::Error;

/// Failure of a single engine evaluation. Never fatal to a selection run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to start engine: {0}")]
    Spawn(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine gave no answer within {0:?}")]
    Timeout(Duration),

    #[error("Engine protocol error: {0}")]
    Protocol(String),
}

#[derive(Error, Debug)]
pub enum FinderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid game record: {0}")]
    MalformedRecord(#[from] RecordError),

    #[error("Analysis did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
