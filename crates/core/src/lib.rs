//! Core domain types and shared logic for Helm chart ingestion.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Asset kinds and their file extensions
//! - Chart metadata extraction from archives and provenance files
//! - Identity validation and canonical chart paths
//! - Content digests under a fixed algorithm set
//! - Token scopes and the permission checker seam

pub mod access;
pub mod asset;
pub mod attributes;
pub mod chart_path;
pub mod config;
pub mod error;
pub mod extract;
pub mod hash;
pub mod token;
pub mod upload;

pub use access::{Action, ContentScope, PermissionChecker};
pub use asset::AssetKind;
pub use attributes::{IdentityField, Maintainer, PackageAttributes, ValidatedIdentity};
pub use chart_path::ChartPath;
pub use error::{Error, Result};
pub use hash::{ContentHash, DigestSet, Digests, HASH_ALGORITHMS, HashAlgorithm};
pub use token::{Token, TokenId, TokenScope};
pub use upload::{
    AssetInfo, PayloadMeta, UploadDefinition, UploadField, UploadResponse, upload_definition,
};

/// Format identifier used for repositories holding Helm charts.
pub const HELM_FORMAT: &str = "helm";

/// Maximum size of an embedded chart manifest or provenance document (1 MiB).
pub const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

/// Default maximum upload size (64 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 64 * 1024 * 1024;
