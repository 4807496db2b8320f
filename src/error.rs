/// Error types shared across the feed pipeline
///
/// `FeedError` travels inside iced messages, so it must be `Clone`.
/// Errors from non-cloneable sources (rusqlite, std::io, image) are
/// flattened into their display string at the conversion boundary.
use thiserror::Error;

use crate::config::ConfigError;
use crate::state::query::QueryError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("catalog error: {0}")]
    Database(String),

    #[error("invalid cursor `{0}`")]
    InvalidCursor(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("image decoding failed: {0}")]
    Decode(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for FeedError {
    fn from(err: rusqlite::Error) -> Self {
        FeedError::Database(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Io(err.to_string())
    }
}

impl From<image::ImageError> for FeedError {
    fn from(err: image::ImageError) -> Self {
        FeedError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Database(format!("malformed stored filters: {}", err))
    }
}

impl From<tokio::task::JoinError> for FeedError {
    fn from(err: tokio::task::JoinError) -> Self {
        FeedError::Task(err.to_string())
    }
}

/// Failures that stop the application before the window opens
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid arguments: {0}")]
    Args(#[from] pico_args::Error),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] FeedError),

    #[error("user interface error: {0}")]
    Ui(#[from] iced::Error),
}

impl From<rusqlite::Error> for StartupError {
    fn from(err: rusqlite::Error) -> Self {
        StartupError::Catalog(err.into())
    }
}
