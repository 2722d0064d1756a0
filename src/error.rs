//! WolfLog Error Types

use thiserror::Error;

/// Result type alias for WolfLog operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfLog error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Log errors
    #[error("Offset {0} not found and is out of range")]
    OutOfRange(u64),

    #[error("End of file")]
    EndOfFile,

    #[error("File is closed or inaccessible: {0}")]
    ClosedFile(String),

    #[error("Corrupt log file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Record serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error means the requested offset does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::OutOfRange(_))
    }

    /// Check if this error signals the end of an index
    pub fn is_end_of_file(&self) -> bool {
        matches!(self, Error::EndOfFile)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::Internal(format!("Lock poisoned: {}", e))
    }
}
