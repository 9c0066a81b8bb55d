//! Atomic persistence of a validated upload.
//!
//! The blob is written under its content-addressed key first, outside any
//! metadata transaction. The asset record is then upserted in a short
//! transaction that also confirms the blob is still present. If the record
//! does not commit, a blob written by this upload is removed again unless
//! another committed asset already points at it.
//!
//! Blob cleanup and the presence check both run inside metadata
//! transactions, which the store serializes, so a blob is never deleted
//! from under a record that commits.

use super::error::UploadError;
use crate::metrics::{BLOBS_DEDUPLICATED, COMMIT_DURATION};
use chartvault_core::{
    AssetKind, ChartPath, Digests, HashAlgorithm, PackageAttributes, PayloadMeta,
    ValidatedIdentity,
};
use chartvault_metadata::models::AssetRow;
use chartvault_metadata::{MetadataStore, UpsertOutcome, transactional};
use chartvault_storage::{
    ObjectStore, StorageError, StorageResult, StreamingUpload, TempBlob, blob_key,
};
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

/// Attempts made when a reused blob disappears before the record commits.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// The persisted result of a successful commit.
#[derive(Clone, Debug)]
pub struct CommitRecord {
    pub repository: String,
    pub path: ChartPath,
    pub digests: Digests,
    pub size: u64,
    pub outcome: UpsertOutcome,
    /// Whether this commit wrote a new blob object rather than reusing one.
    pub blob_written: bool,
}

impl CommitRecord {
    pub fn kind(&self) -> AssetKind {
        self.path.kind()
    }
}

/// Persists temp blobs and their asset records.
#[derive(Clone)]
pub struct CommitCoordinator {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl CommitCoordinator {
    pub fn new(storage: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { storage, metadata }
    }

    /// Store `blob` at `path` in `repository`.
    ///
    /// Either the asset record is committed pointing at a fully written blob,
    /// or no record changes. An existing record at the same path is replaced.
    #[instrument(
        skip_all,
        fields(
            repository = %repository,
            path = %path,
            kind = %path.kind(),
            size = blob.size(),
            sha256 = %blob.sha256(),
        )
    )]
    pub async fn commit(
        &self,
        repository: &str,
        path: &ChartPath,
        blob: &TempBlob,
        payload: &PayloadMeta,
        identity: &ValidatedIdentity,
        attributes: &PackageAttributes,
    ) -> Result<CommitRecord, UploadError> {
        let start = Instant::now();
        let key = blob_key(blob.sha256());
        let now = OffsetDateTime::now_utc();

        let row = AssetRow {
            repository: repository.to_string(),
            path: path.as_str().to_string(),
            kind: path.kind().as_str().to_string(),
            name: identity.name().to_string(),
            version: identity.version().to_string(),
            blob_key: key.clone(),
            sha256: blob.sha256().to_hex(),
            sha512: blob.digests().hex(HashAlgorithm::Sha512),
            size_bytes: blob.size() as i64,
            content_type: path.kind().content_type().to_string(),
            declared_filename: payload.filename.clone(),
            declared_content_type: payload.content_type.clone(),
            attributes_json: attributes.to_json()?,
            created_at: now,
            updated_at: now,
        };

        let mut blob_written = false;
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.store_blob(&key, blob).await {
                Ok(written) => blob_written |= written,
                Err(e) => break Err(e),
            }
            match self.upsert(&key, &row).await {
                Err(UploadError::Io(StorageError::NotFound(_)))
                    if attempt < MAX_COMMIT_ATTEMPTS =>
                {
                    debug!(blob_key = %key, attempt, "blob removed before commit, rewriting");
                }
                other => break other,
            }
        };
        COMMIT_DURATION.observe(start.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                if !blob_written {
                    BLOBS_DEDUPLICATED.inc();
                }
                debug!(blob_key = %key, "asset record committed");
                Ok(CommitRecord {
                    repository: repository.to_string(),
                    path: path.clone(),
                    digests: blob.digests().clone(),
                    size: blob.size(),
                    outcome,
                    blob_written,
                })
            }
            Err(e) => {
                warn!(blob_key = %key, error = %e, "commit failed");
                if blob_written {
                    self.discard_unreferenced(&key).await;
                }
                Err(e)
            }
        }
    }

    /// Write the blob unless its key is already present.
    ///
    /// Returns whether a new object was written. A write that ends with the
    /// wrong size is removed again before the error is returned.
    async fn store_blob(&self, key: &str, blob: &TempBlob) -> Result<bool, UploadError> {
        if self.storage.exists(key).await? {
            debug!(blob_key = key, "blob already stored");
            return Ok(false);
        }

        let size = write_blob(self.storage.as_ref(), key, blob.open().await?).await?;
        if size != blob.size() {
            self.discard_unreferenced(key).await;
            return Err(UploadError::Io(StorageError::Io(std::io::Error::other(
                format!("wrote {size} bytes, expected {}", blob.size()),
            ))));
        }
        Ok(true)
    }

    /// Upsert `row` in one transaction, failing with
    /// [`StorageError::NotFound`] if its blob is gone.
    async fn upsert(&self, key: &str, row: &AssetRow) -> Result<UpsertOutcome, UploadError> {
        let storage = self.storage.clone();
        let key = key.to_string();
        let row = row.clone();
        transactional(self.metadata.as_ref(), move |tx| {
            async move {
                let outcome = tx.upsert_asset(&row).await?;
                if !storage.exists(&key).await? {
                    return Err(UploadError::Io(StorageError::NotFound(key)));
                }
                Ok(outcome)
            }
            .boxed()
        })
        .await
    }

    /// Delete a blob no committed asset points at. Best effort.
    ///
    /// The reference count and delete run while holding a transaction so a
    /// concurrent commit cannot adopt the blob in between.
    async fn discard_unreferenced(&self, key: &str) {
        let storage = self.storage.clone();
        let owned_key = key.to_string();
        let result: Result<bool, UploadError> =
            transactional(self.metadata.as_ref(), move |tx| {
                async move {
                    let references = tx.count_blob_references(&owned_key).await?;
                    if references == 0 {
                        storage.delete(&owned_key).await?;
                    }
                    Ok(references == 0)
                }
                .boxed()
            })
            .await;

        match result {
            Ok(true) => info!(blob_key = key, "removed blob left by failed commit"),
            Ok(false) => debug!(blob_key = key, "blob still referenced, keeping"),
            Err(e) => warn!(
                blob_key = key,
                error = %e,
                "failed to remove blob left by failed commit"
            ),
        }
    }
}

/// Stream a temp file into the object store, returning the bytes written.
async fn write_blob(
    storage: &dyn ObjectStore,
    key: &str,
    source: tokio::fs::File,
) -> StorageResult<u64> {
    let mut upload = storage.put_stream(key).await?;
    if let Err(e) = copy_into(upload.as_mut(), source).await {
        if let Err(abort_err) = upload.abort().await {
            warn!(blob_key = key, error = %abort_err, "failed to abort blob upload");
        }
        return Err(e);
    }
    upload.finish().await
}

async fn copy_into(upload: &mut dyn StreamingUpload, source: tokio::fs::File) -> StorageResult<()> {
    let mut chunks = ReaderStream::new(source);
    while let Some(chunk) = chunks.next().await {
        upload.write(chunk?).await?;
    }
    Ok(())
}
