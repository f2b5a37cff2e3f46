//! CDC error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdcError>;

#[derive(Debug, Error)]
pub enum CdcError {
    /// Socket-level failure while talking to the server.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The replication connection could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server rejected or we could not complete authentication.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server sent something the replication protocol does not allow here.
    #[error("Replication protocol error: {0}")]
    Protocol(String),

    /// Publication/slot setup over the regular connection failed.
    #[error("Replication setup failed: {0}")]
    Setup(#[from] sqlx::Error),

    /// Invalid configuration (bad connection URL, empty identifier).
    #[error("Invalid CDC configuration: {0}")]
    Config(String),
}
