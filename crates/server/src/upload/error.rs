//! Upload pipeline errors.

use axum::http::StatusCode;
use chartvault_core::IdentityField;
use chartvault_metadata::MetadataError;
use chartvault_storage::StorageError;
use thiserror::Error;

/// Why an upload did not commit.
///
/// Every variant aborts the remaining stages. The temp blob is released and
/// nothing is visible in the repository.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported extension: {0:?}")]
    UnsupportedInput(String),

    #[error("malformed package: {0}")]
    MalformedPackage(String),

    #[error("metadata is missing the {0} attribute")]
    Validation(IdentityField),

    #[error("{field} attribute {value:?} must not contain path separators or '..'")]
    InvalidAttribute { field: IdentityField, value: String },

    #[error("not permitted to write {path} in repository {repository}")]
    PermissionDenied { repository: String, path: String },

    #[error("{0}")]
    Io(#[from] StorageError),

    #[error("commit failed: {0}")]
    Commit(#[from] MetadataError),
}

impl UploadError {
    /// Error code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedInput(_) => "unsupported_input",
            Self::MalformedPackage(_) => "malformed_package",
            Self::Validation(_) | Self::InvalidAttribute { .. } => "validation_error",
            Self::PermissionDenied { .. } => "forbidden",
            Self::Io(_) => "io_error",
            Self::Commit(_) => "commit_error",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedInput(_)
            | Self::MalformedPackage(_)
            | Self::Validation(_)
            | Self::InvalidAttribute { .. } => StatusCode::BAD_REQUEST,
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::Io(StorageError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Io(_) | Self::Commit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<chartvault_core::Error> for UploadError {
    fn from(e: chartvault_core::Error) -> Self {
        use chartvault_core::Error;

        match e {
            Error::UnsupportedExtension(ext) => Self::UnsupportedInput(ext),
            Error::MissingAttribute(field) => Self::Validation(field),
            Error::InvalidAttribute { field, value } => Self::InvalidAttribute { field, value },
            Error::Io(e) => Self::Io(StorageError::Io(e)),
            Error::Serialization(msg) => Self::Commit(MetadataError::Internal(msg)),
            Error::MalformedPackage(msg) => Self::MalformedPackage(msg),
            other => Self::MalformedPackage(other.to_string()),
        }
    }
}
