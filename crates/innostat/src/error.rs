//! Error types for the innostat agent.

use thiserror::Error;

/// Errors that can occur while setting up or running the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pipeline error (source, catalog or store).
    #[error(transparent)]
    Metrics(#[from] innostat_core::MetricsError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
