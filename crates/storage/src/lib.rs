//! Blob storage and temporary upload spooling for Chartvault.
//!
//! This crate provides:
//! - Content-addressed blob storage with atomic writes
//! - Scoped temp blobs that hash uploads while spooling them to disk
//! - Backends: local filesystem

pub mod backends;
pub mod error;
pub mod temp;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use temp::{TempBlob, TempStore};
pub use traits::{ByteStream, ObjectStore, StreamingUpload};

use chartvault_core::ContentHash;
use chartvault_core::config::StorageConfig;
use std::sync::Arc;

/// Object key for a blob with the given SHA-256: `blobs/sha256/<aa>/<hex>`.
pub fn blob_key(hash: &ContentHash) -> String {
    let hex = hash.to_hex();
    format!("blobs/sha256/{}/{}", &hex[..2], hex)
}

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
