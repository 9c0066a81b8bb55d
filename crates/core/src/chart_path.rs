//! Canonical storage paths for chart assets.

use crate::asset::AssetKind;
use crate::attributes::ValidatedIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical path of an asset inside a repository: `<name>-<version><extension>`.
///
/// The path is both the overwrite key in the metadata store and the resource
/// checked by the access gate.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartPath {
    path: String,
    kind: AssetKind,
}

impl ChartPath {
    /// Derive the path for a validated identity. Pure and deterministic.
    pub fn resolve(identity: &ValidatedIdentity, kind: AssetKind) -> Self {
        Self {
            path: format!(
                "{}-{}{}",
                identity.name(),
                identity.version(),
                kind.extension()
            ),
            kind,
        }
    }

    /// Parse a path received from a client, classifying it by suffix.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let kind = AssetKind::from_filename(Some(path))
            .map_err(|_| crate::Error::InvalidChartPath(format!("unknown extension: {path}")))?;

        let stem = &path[..path.len() - kind.extension().len()];
        if stem.is_empty() {
            return Err(crate::Error::InvalidChartPath(
                "name cannot be empty".to_string(),
            ));
        }
        if path.contains('/') || path.contains('\\') || path.contains("..") {
            return Err(crate::Error::InvalidChartPath(format!(
                "path separators not allowed: {path}"
            )));
        }

        Ok(Self {
            path: path.to_string(),
            kind,
        })
    }

    /// Get the path string.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Get the asset kind this path was resolved for.
    pub fn kind(&self) -> AssetKind {
        self.kind
    }
}

impl fmt::Debug for ChartPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChartPath({})", self.path)
    }
}

impl fmt::Display for ChartPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
