//! Metadata store for Chartvault.
//!
//! This crate provides the control-plane data model:
//! - Committed chart and provenance assets keyed by repository and path
//! - Tokens, scopes, and revocation
//! - The admin bootstrap marker
//! - A transactional unit of work for asset writes

pub mod error;
pub mod models;
pub mod repos;
pub mod store;
pub mod tx;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};
pub use tx::{AssetTransaction, UpsertOutcome, transactional};

use chartvault_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
