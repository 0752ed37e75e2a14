//! Error types for dataset writes

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WriterError>;

#[derive(Error, Debug)]
pub enum WriterError {
    /// Invalid write arguments. Raised before any storage I/O happens.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl WriterError {
    /// Whether the caller can fix the failure by retrying with other arguments.
    pub fn is_config(&self) -> bool {
        matches!(self, WriterError::Config(_))
    }
}

impl From<object_store::Error> for WriterError {
    fn from(err: object_store::Error) -> Self {
        WriterError::ObjectStore(err.to_string())
    }
}

impl From<object_store::path::Error> for WriterError {
    fn from(err: object_store::path::Error) -> Self {
        WriterError::InvalidPath(err.to_string())
    }
}

impl From<WriterError> for polars::prelude::PolarsError {
    fn from(err: WriterError) -> Self {
        match err {
            WriterError::Polars(e) => e,
            other => polars::prelude::PolarsError::ComputeError(
                format!("Dataset writer error: {}", other).into(),
            ),
        }
    }
}
