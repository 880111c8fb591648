//! Error types for spiking_net

use thiserror::Error;

/// Result type for spiking_net operations
pub type Result<T> = std::result::Result<T, SnnError>;

#[derive(Error, Debug)]
pub enum SnnError {
    /// Invalid network or layer configuration, raised at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl SnnError {
    pub(crate) fn shape(expected: impl Into<String>, actual: impl std::fmt::Debug) -> Self {
        SnnError::Shape {
            expected: expected.into(),
            actual: format!("{actual:?}"),
        }
    }
}
