//! Permission checks scoped to repository content.

use crate::token::Token;
use serde::Serialize;
use std::fmt;

/// Operation being authorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// The resource an action targets: a path inside a repository of a format.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ContentScope {
    pub repository: String,
    pub format: String,
    pub path: String,
}

impl ContentScope {
    pub fn new(
        repository: impl Into<String>,
        format: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            format: format.into(),
            path: path.into(),
        }
    }
}

/// Decides whether an action on a content scope is allowed.
pub trait PermissionChecker: Send + Sync {
    fn permitted(&self, scope: &ContentScope, action: Action) -> bool;
}

impl PermissionChecker for Token {
    fn permitted(&self, scope: &ContentScope, action: Action) -> bool {
        match action {
            Action::Read => self.can_read(&scope.repository),
            Action::Write => self.can_write(&scope.repository),
        }
    }
}
