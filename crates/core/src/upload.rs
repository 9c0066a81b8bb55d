//! Upload definition and upload API types.

use crate::asset::AssetKind;
use crate::attributes::PackageAttributes;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Multipart field name carrying the uploaded asset.
pub const ASSET_FIELD: &str = "helm.asset";

/// A field accepted by the upload form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub display_name: String,
    pub help_text: String,
    pub optional: bool,
}

/// Describes what the upload endpoint accepts for Helm repositories.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDefinition {
    pub format: String,
    pub multiple_upload: bool,
    pub fields: Vec<UploadField>,
}

/// Get the upload definition, built on first use.
pub fn upload_definition() -> &'static UploadDefinition {
    static DEFINITION: OnceLock<UploadDefinition> = OnceLock::new();
    DEFINITION.get_or_init(|| UploadDefinition {
        format: crate::HELM_FORMAT.to_string(),
        multiple_upload: false,
        fields: vec![UploadField {
            name: ASSET_FIELD.to_string(),
            field_type: "file".to_string(),
            display_name: "Chart package".to_string(),
            help_text: format!(
                "A packaged chart ({}) or its provenance file ({})",
                AssetKind::PrimaryArchive.extension(),
                AssetKind::DetachedSignature.extension()
            ),
            optional: false,
        }],
    })
}

/// What the client declared about an uploaded payload.
///
/// Kept with the committed asset for reference. The asset kind and path never
/// depend on the declared content type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMeta {
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Response returned after a successful upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub repository: String,
    pub path: String,
    pub kind: AssetKind,
    pub name: String,
    pub version: String,
    pub sha256: String,
    pub size: u64,
}

/// A committed asset as returned by the listing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetInfo {
    pub repository: String,
    pub path: String,
    pub kind: AssetKind,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    pub size: u64,
    pub content_type: String,
    /// Payload details declared by the uploader.
    pub payload: PayloadMeta,
    pub attributes: PackageAttributes,
    pub created_at: String,
    pub updated_at: String,
}
