//! Error types for the application

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transient acquisition error: {0}")]
    TransientAcquisition(String),

    #[error("Acquisition device unavailable: {0}")]
    PermanentAcquisition(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl Error {
    /// Whether this error must terminate the process.
    ///
    /// Transient reads and failed notifications are absorbed by the loop;
    /// everything the loop cannot recover from is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::PermanentAcquisition(_))
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
