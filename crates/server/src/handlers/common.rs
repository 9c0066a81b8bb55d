//! Health and discovery endpoints.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use chartvault_core::{UploadDefinition, upload_definition};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health - Check metadata and storage connectivity.
///
/// Unauthenticated so load balancers can probe it.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /v1/upload-definition - Describe the fields an upload accepts.
pub async fn get_upload_definition() -> Json<&'static UploadDefinition> {
    Json(upload_definition())
}
