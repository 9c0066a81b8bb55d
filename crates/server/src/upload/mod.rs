//! The chart upload pipeline.
//!
//! An upload moves through fixed stages, each of which can end it:
//!
//! 1. intake: spool and hash the payload into a [`TempBlob`]
//! 2. classify: pick the [`AssetKind`] from the declared filename
//! 3. extract: read chart metadata from the archive or provenance file
//! 4. validate: require a name and a version
//! 5. resolve: derive the canonical [`ChartPath`]
//! 6. authorize: check write permission on that path
//! 7. commit: persist blob and asset record atomically
//!
//! The temp blob lives for the duration of [`UploadPipeline::upload`] and is
//! released when it returns, whichever stage it returned from.

pub mod commit;
pub mod error;
pub mod gate;

pub use commit::{CommitCoordinator, CommitRecord};
pub use error::UploadError;
pub use gate::AccessGate;

use crate::metrics::{BYTES_COMMITTED, TEMP_BLOBS_LIVE, UPLOADS_COMMITTED, record_upload_failure};
use bytes::Bytes;
use chartvault_core::extract::extract;
use chartvault_core::{
    AssetKind, ChartPath, HASH_ALGORITHMS, HELM_FORMAT, PackageAttributes, PayloadMeta,
    PermissionChecker, UploadResponse,
};
use chartvault_metadata::MetadataStore;
use chartvault_storage::{ObjectStore, StorageError, TempBlob, TempStore};
use futures::Stream;
use std::io::BufReader;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// An uploaded payload as received from the client.
pub struct UploadPayload<S> {
    pub stream: S,
    /// Filename declared by the client; decides the asset kind.
    pub filename: Option<String>,
    /// Declared content type, recorded with the asset.
    pub content_type: Option<String>,
}

/// Runs uploads from intake to commit.
#[derive(Clone)]
pub struct UploadPipeline {
    temp_store: TempStore,
    coordinator: CommitCoordinator,
}

impl UploadPipeline {
    pub fn new(
        temp_store: TempStore,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            temp_store,
            coordinator: CommitCoordinator::new(storage, metadata),
        }
    }

    pub fn temp_store(&self) -> &TempStore {
        &self.temp_store
    }

    /// Upload one payload into `repository`, authorized by `checker`.
    pub async fn upload<S, E>(
        &self,
        repository: &str,
        payload: UploadPayload<S>,
        checker: &dyn PermissionChecker,
    ) -> Result<UploadResponse, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let result = self.run(repository, payload, checker).await;
        TEMP_BLOBS_LIVE.set(self.temp_store.live_blobs() as i64);

        match &result {
            Ok(response) => {
                UPLOADS_COMMITTED.inc();
                BYTES_COMMITTED.inc_by(response.size);
            }
            Err(e) => record_upload_failure(e.code()),
        }
        result
    }

    #[instrument(
        skip_all,
        fields(repository = %repository, filename = payload.filename.as_deref())
    )]
    async fn run<S, E>(
        &self,
        repository: &str,
        payload: UploadPayload<S>,
        checker: &dyn PermissionChecker,
    ) -> Result<UploadResponse, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let UploadPayload {
            stream,
            filename,
            content_type,
        } = payload;
        let declared = PayloadMeta {
            filename,
            content_type,
        };
        debug!(content_type = declared.content_type.as_deref(), "receiving upload");

        let blob = self
            .temp_store
            .acquire(stream, declared.filename.clone(), HASH_ALGORITHMS)
            .await?;
        TEMP_BLOBS_LIVE.set(self.temp_store.live_blobs() as i64);

        let kind = AssetKind::from_filename(blob.declared_name())?;
        let attributes = extract_attributes(&blob, kind).await?;
        let identity = attributes.validate()?;
        let path = ChartPath::resolve(&identity, kind);

        AccessGate::new(checker).authorize(repository, HELM_FORMAT, &path)?;

        let record = self
            .coordinator
            .commit(repository, &path, &blob, &declared, &identity, &attributes)
            .await?;

        info!(
            path = %record.path,
            kind = %record.kind(),
            size = record.size,
            sha256 = %record.digests.sha256,
            outcome = ?record.outcome,
            blob_written = record.blob_written,
            "upload committed"
        );

        Ok(UploadResponse {
            repository: record.repository,
            path: record.path.as_str().to_string(),
            kind: record.path.kind(),
            name: identity.name().to_string(),
            version: identity.version().to_string(),
            sha256: record.digests.sha256.to_hex(),
            size: record.size,
        })
    }
}

/// Parse chart metadata from the temp blob on the blocking pool.
#[instrument(skip(blob), fields(size = blob.size()))]
async fn extract_attributes(
    blob: &TempBlob,
    kind: AssetKind,
) -> Result<PackageAttributes, UploadError> {
    let reader = BufReader::new(blob.reader()?);
    let attributes = tokio::task::spawn_blocking(move || extract(reader, kind))
        .await
        .map_err(|e| UploadError::Io(StorageError::Io(std::io::Error::other(e))))??;
    Ok(attributes)
}
