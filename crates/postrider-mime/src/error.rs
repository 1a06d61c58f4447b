//! Error types for MIME message construction.

use std::path::PathBuf;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME construction error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or undecodable encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The message record is incomplete or contradictory.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// An attachment referenced by path could not be read.
    #[error("Failed to read attachment {path}: {source}")]
    AttachmentRead {
        /// The offending path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Base64 decoding failed.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes were not valid UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
