//! Error types for the innostat-core crate.

use thiserror::Error;

/// Errors that can occur in the polling pipeline.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The metric name is invalid (empty or too long).
    #[error("invalid metric name: {reason}")]
    InvalidMetricName {
        /// The reason the name is invalid.
        reason: String,
    },

    /// Querying the monitored server failed.
    #[error("source error: {reason}")]
    Source {
        /// The reason the query failed.
        reason: String,
    },

    /// The embedded store rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A measurement batch could not be serialized for the JSON echo.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing the JSON echo failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetricsError {
    /// Builds a [`MetricsError::Source`] from anything printable.
    pub fn source_error(reason: impl std::fmt::Display) -> Self {
        Self::Source {
            reason: reason.to_string(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
