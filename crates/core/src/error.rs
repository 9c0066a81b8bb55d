//! Error types for the core domain.

use crate::attributes::IdentityField;
use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("malformed package: {0}")]
    MalformedPackage(String),

    #[error("metadata is missing the {0} attribute")]
    MissingAttribute(IdentityField),

    #[error("{field} attribute {value:?} must not contain path separators or '..'")]
    InvalidAttribute { field: IdentityField, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chart path: {0}")]
    InvalidChartPath(String),

    #[error("invalid asset kind: {0}")]
    InvalidAssetKind(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
