//! Unit of work over asset records.
//!
//! A transaction either commits every write made through it or none of them.
//! [`transactional`] runs a closure inside one and decides the outcome from
//! the closure's result.

use crate::error::{MetadataError, MetadataResult};
use crate::models::AssetRow;
use crate::store::MetadataStore;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

/// Whether an upsert created a new record or replaced one at the same path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Replaced { previous_blob_key: String },
}

/// An open metadata transaction.
#[async_trait]
pub trait AssetTransaction: Send {
    /// Insert or overwrite the asset at (repository, path).
    ///
    /// On overwrite `created_at` is preserved and every other column replaced.
    async fn upsert_asset(&mut self, asset: &AssetRow) -> MetadataResult<UpsertOutcome>;

    /// Read an asset as seen by this transaction.
    async fn get_asset(&mut self, repository: &str, path: &str)
    -> MetadataResult<Option<AssetRow>>;

    /// Number of assets, as seen by this transaction, stored under `blob_key`.
    async fn count_blob_references(&mut self, blob_key: &str) -> MetadataResult<u64>;

    /// Make every write visible.
    async fn commit(self: Box<Self>) -> MetadataResult<()>;

    /// Discard every write.
    async fn rollback(self: Box<Self>) -> MetadataResult<()>;
}

/// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
///
/// A failed rollback is logged and the closure's error returned. A failed
/// commit is returned as the error.
pub async fn transactional<T, E, F>(store: &dyn MetadataStore, f: F) -> Result<T, E>
where
    F: for<'t> FnOnce(&'t mut dyn AssetTransaction) -> BoxFuture<'t, Result<T, E>>,
    E: From<MetadataError>,
{
    let mut tx = store.begin().await?;
    match f(tx.as_mut()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(e)
        }
    }
}
