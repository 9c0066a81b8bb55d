//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A committed chart or provenance asset, keyed by (repository, path).
#[derive(Debug, Clone, FromRow)]
pub struct AssetRow {
    pub repository: String,
    pub path: String,
    pub kind: String,
    pub name: String,
    pub version: String,
    pub blob_key: String,
    pub sha256: String,
    pub sha512: Option<String>,
    pub size_bytes: i64,
    pub content_type: String,
    /// Filename the uploader declared, if any.
    pub declared_filename: Option<String>,
    /// Content type the uploader declared, if any.
    pub declared_content_type: Option<String>,
    pub attributes_json: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// API token record.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub repository: Option<String>,
    pub token_hash: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}
