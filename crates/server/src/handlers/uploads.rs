//! Chart upload endpoint.

use crate::auth::{get_trace_id, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::upload::UploadPayload;
use axum::Json;
use axum::extract::multipart::Field;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::StatusCode;
use chartvault_core::UploadResponse;
use chartvault_core::upload::ASSET_FIELD;

/// POST /v1/repositories/{repository}/upload - Upload a chart or provenance file.
///
/// Takes the multipart part named `helm.asset`, or the first part carrying a
/// filename. Later parts are ignored.
pub async fn upload_asset(
    State(state): State<AppState>,
    Path(repository): Path<String>,
    req: Request,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();
    let auth = require_auth(&req)?.clone();

    let mut multipart = Multipart::from_request(req, &state)
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart request: {e}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        if !is_asset_part(&field) {
            tracing::debug!(field = field.name(), "skipping multipart field");
            continue;
        }

        let payload = UploadPayload {
            filename: field.file_name().map(str::to_string),
            content_type: field.content_type().map(str::to_string),
            stream: field,
        };

        let response = state
            .pipeline
            .upload(&repository, payload, &auth.token)
            .await
            .inspect_err(|e| {
                tracing::info!(
                    trace_id = %trace_id,
                    repository = %repository,
                    code = e.code(),
                    error = %e,
                    "upload rejected"
                );
            })?;

        return Ok((StatusCode::CREATED, Json(response)));
    }

    Err(ApiError::BadRequest(format!(
        "multipart request contained no {ASSET_FIELD} part"
    )))
}

fn is_asset_part(field: &Field<'_>) -> bool {
    field.name() == Some(ASSET_FIELD) || field.file_name().is_some()
}
