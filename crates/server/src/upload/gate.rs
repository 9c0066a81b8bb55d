//! Write authorization against the resolved chart path.

use super::error::UploadError;
use chartvault_core::{Action, ChartPath, ContentScope, PermissionChecker};
use tracing::warn;

/// Checks write permission for one upload.
pub struct AccessGate<'a> {
    checker: &'a dyn PermissionChecker,
}

impl<'a> AccessGate<'a> {
    pub fn new(checker: &'a dyn PermissionChecker) -> Self {
        Self { checker }
    }

    /// Authorize a write of `path` into `repository`.
    ///
    /// The checker is consulted exactly once. The resource is always the
    /// resolved path, never the filename the client declared.
    pub fn authorize(
        &self,
        repository: &str,
        format: &str,
        path: &ChartPath,
    ) -> Result<(), UploadError> {
        let scope = ContentScope::new(repository, format, path.as_str());
        if self.checker.permitted(&scope, Action::Write) {
            Ok(())
        } else {
            warn!(repository, path = %path, "upload denied");
            Err(UploadError::PermissionDenied {
                repository: repository.to_string(),
                path: path.as_str().to_string(),
            })
        }
    }
}
