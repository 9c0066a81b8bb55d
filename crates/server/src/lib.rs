//! HTTP server for Chartvault, a Helm chart repository.
//!
//! This crate provides:
//! - The upload pipeline (intake, extraction, validation, authorization, commit)
//! - Asset listing and download endpoints
//! - Token authentication and admin token bootstrap
//! - Prometheus metrics

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod upload;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use upload::{UploadError, UploadPayload, UploadPipeline};
