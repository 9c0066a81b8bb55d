//! Asset kinds and extension-based classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension of a packaged chart archive.
pub const TGZ_EXTENSION: &str = ".tgz";

/// Extension of a detached provenance (signature) file.
pub const PROVENANCE_EXTENSION: &str = ".tgz.prov";

/// Kind of asset stored in a Helm repository.
///
/// Decided once from the declared filename and carried through the pipeline;
/// never inferred from content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// A packaged chart (`.tgz`).
    PrimaryArchive,
    /// A detached provenance file (`.tgz.prov`).
    DetachedSignature,
}

impl AssetKind {
    /// Classify a declared filename by its suffix.
    ///
    /// Matching is case-sensitive and checks the longer provenance suffix
    /// first, since it also ends in a recognized archive-like extension.
    pub fn from_filename(filename: Option<&str>) -> crate::Result<Self> {
        let filename = filename.unwrap_or_default();
        if filename.ends_with(PROVENANCE_EXTENSION) {
            Ok(Self::DetachedSignature)
        } else if filename.ends_with(TGZ_EXTENSION) {
            Ok(Self::PrimaryArchive)
        } else {
            Err(crate::Error::UnsupportedExtension(
                extension_of(filename).to_string(),
            ))
        }
    }

    /// Extension appended to `<name>-<version>` for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::PrimaryArchive => TGZ_EXTENSION,
            Self::DetachedSignature => PROVENANCE_EXTENSION,
        }
    }

    /// Content type served for this kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::PrimaryArchive => "application/gzip",
            Self::DetachedSignature => "application/pgp-signature",
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryArchive => "primary_archive",
            Self::DetachedSignature => "detached_signature",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "primary_archive" => Ok(Self::PrimaryArchive),
            "detached_signature" => Ok(Self::DetachedSignature),
            _ => Err(crate::Error::InvalidAssetKind(s.to_string())),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final `.suffix` of a filename, or an empty string.
fn extension_of(filename: &str) -> &str {
    filename.rfind('.').map(|i| &filename[i..]).unwrap_or("")
}
