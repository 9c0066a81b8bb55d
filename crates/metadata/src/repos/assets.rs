//! Asset repository.

use crate::error::MetadataResult;
use crate::models::AssetRow;
use async_trait::async_trait;

/// Read access to committed assets.
///
/// Writes only happen through [`crate::tx::AssetTransaction`].
#[async_trait]
pub trait AssetRepo: Send + Sync {
    /// Get an asset by repository and path.
    async fn get_asset(&self, repository: &str, path: &str) -> MetadataResult<Option<AssetRow>>;

    /// List assets in a repository, ordered by path.
    async fn list_assets(&self, repository: &str) -> MetadataResult<Vec<AssetRow>>;

    /// Count committed assets whose content lives under `blob_key`.
    async fn count_blob_references(&self, blob_key: &str) -> MetadataResult<u64>;
}
