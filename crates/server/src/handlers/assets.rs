//! Asset listing and download endpoints.

use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use chartvault_core::{AssetInfo, AssetKind, ChartPath, PackageAttributes, PayloadMeta};
use chartvault_metadata::models::AssetRow;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

/// Response for the asset listing.
#[derive(Debug, Serialize)]
pub struct ListAssetsResponse {
    pub repository: String,
    pub assets: Vec<AssetInfo>,
}

/// GET /v1/repositories/{repository}/assets - List committed assets.
pub async fn list_assets(
    State(state): State<AppState>,
    Path(repository): Path<String>,
    req: Request,
) -> ApiResult<Json<ListAssetsResponse>> {
    let auth = require_auth(&req)?;
    auth.require_read(&repository)?;

    let assets = state
        .metadata
        .list_assets(&repository)
        .await?
        .into_iter()
        .map(asset_info)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(ListAssetsResponse { repository, assets }))
}

/// GET /v1/repositories/{repository}/assets/{path} - Download an asset.
pub async fn download_asset(
    State(state): State<AppState>,
    Path((repository, path)): Path<(String, String)>,
    req: Request,
) -> ApiResult<Response> {
    let auth = require_auth(&req)?;
    auth.require_read(&repository)?;

    let path = ChartPath::parse(&path)?;
    let asset = state
        .metadata
        .get_asset(&repository, path.as_str())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("asset not found: {path}")))?;

    let stream = state.storage.get_stream(&asset.blob_key).await?;

    let content_type = HeaderValue::from_str(&asset.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(path.kind().content_type()));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(asset.size_bytes)),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Convert a stored row to its API form.
fn asset_info(row: AssetRow) -> ApiResult<AssetInfo> {
    let format = |ts: time::OffsetDateTime| {
        ts.format(&Rfc3339)
            .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
    };

    Ok(AssetInfo {
        kind: AssetKind::parse(&row.kind).map_err(|e| ApiError::Internal(e.to_string()))?,
        attributes: PackageAttributes::from_json(&row.attributes_json)
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        size: u64::try_from(row.size_bytes)
            .map_err(|_| ApiError::Internal(format!("negative size for {}", row.path)))?,
        created_at: format(row.created_at)?,
        updated_at: format(row.updated_at)?,
        repository: row.repository,
        path: row.path,
        sha256: row.sha256,
        sha512: row.sha512,
        content_type: row.content_type,
        payload: PayloadMeta {
            filename: row.declared_filename,
            content_type: row.declared_content_type,
        },
    })
}
