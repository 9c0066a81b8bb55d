//! Package attributes extracted from chart metadata, and identity validation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity field required on every uploaded asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityField {
    Name,
    Version,
}

impl IdentityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Version => "version",
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart maintainer entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub url: Option<String>,
}

/// Attributes describing an uploaded chart or provenance file.
///
/// `name` and `version`, when present, are trimmed and never blank.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAttributes {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,
}

impl PackageAttributes {
    /// Create attributes carrying only an identity.
    pub fn new(name: Option<&str>, version: Option<&str>) -> Self {
        Self {
            name: normalize(name),
            version: normalize(version),
            ..Default::default()
        }
    }

    /// Check that both identity fields are present and usable in a path.
    ///
    /// The name is checked before the version, so an upload missing both
    /// reports the name. Values containing `/`, a backslash or `..` are rejected
    /// since they could not be addressed as a single path segment.
    pub fn validate(&self) -> crate::Result<ValidatedIdentity> {
        let name = required(self.name.as_deref(), IdentityField::Name)?;
        let version = required(self.version.as_deref(), IdentityField::Version)?;
        Ok(ValidatedIdentity {
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Serialize to the JSON stored alongside the asset record.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Parse from stored JSON.
    pub fn from_json(s: &str) -> crate::Result<Self> {
        serde_json::from_str(s).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

/// Trim a value, mapping blank strings to `None`.
pub(crate) fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: Option<&str>, field: IdentityField) -> crate::Result<&str> {
    match value.map(str::trim) {
        Some(v) if v.is_empty() => Err(crate::Error::MissingAttribute(field)),
        Some(v) if v.contains(['/', '\\']) || v.contains("..") => {
            Err(crate::Error::InvalidAttribute {
                field,
                value: v.to_string(),
            })
        }
        Some(v) => Ok(v),
        None => Err(crate::Error::MissingAttribute(field)),
    }
}

/// A name and version that passed validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValidatedIdentity {
    name: String,
    version: String,
}

impl ValidatedIdentity {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}
