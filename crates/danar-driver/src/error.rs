//! Driver error types.

use danar_protocol::ProtocolError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the pump session.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Encoding or decoding a message failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The command queue already holds the configured maximum.
    #[error("command queue full ({max_pending} pending)")]
    QueueFull {
        /// Configured queue limit.
        max_pending: usize,
    },
}

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
