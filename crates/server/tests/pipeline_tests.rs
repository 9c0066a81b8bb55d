//! Tests driving the upload pipeline directly with mock collaborators.

mod common;

use bytes::Bytes;
use chartvault_core::{Action, AssetKind, HELM_FORMAT};
use chartvault_metadata::{MetadataStore, SqliteStore};
use chartvault_server::{UploadError, UploadPayload, UploadPipeline};
use chartvault_storage::{FilesystemBackend, ObjectStore, StorageError, TempStore};
use common::fixtures::{chart_archive, provenance, sha256_hash};
use common::mocks::{FailingStore, RecordingChecker, StallingStore};
use futures::{StreamExt, stream};
use sha2::{Digest, Sha512};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

const REPO: &str = "stable";

struct Harness {
    pipeline: UploadPipeline,
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    sqlite: Arc<SqliteStore>,
    temp_path: PathBuf,
    storage_path: PathBuf,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self::build(None, |storage| storage).await
    }

    async fn build<F>(max_size: Option<u64>, wrap: F) -> Self
    where
        F: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        let dir = tempfile::tempdir().unwrap();
        let storage_path = dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> =
            Arc::new(FilesystemBackend::new(&storage_path).await.unwrap());
        let storage = wrap(storage);
        let sqlite = Arc::new(
            SqliteStore::new(&dir.path().join("metadata.db"), None)
                .await
                .unwrap(),
        );
        let temp_path = dir.path().join("uploads");
        let temp_store = TempStore::new(&temp_path, max_size).await.unwrap();
        let metadata: Arc<dyn MetadataStore> = sqlite.clone();
        let pipeline = UploadPipeline::new(temp_store, storage.clone(), metadata.clone());

        Self {
            pipeline,
            storage,
            metadata,
            sqlite,
            temp_path,
            storage_path,
            _dir: dir,
        }
    }

    async fn upload(
        &self,
        filename: &str,
        data: Bytes,
        checker: &RecordingChecker,
    ) -> Result<chartvault_core::UploadResponse, UploadError> {
        self.upload_to(REPO, filename, data, checker).await
    }

    async fn upload_to(
        &self,
        repository: &str,
        filename: &str,
        data: Bytes,
        checker: &RecordingChecker,
    ) -> Result<chartvault_core::UploadResponse, UploadError> {
        let payload = UploadPayload {
            stream: stream::iter([Ok::<_, Infallible>(data)]),
            filename: Some(filename.to_string()),
            content_type: Some("application/gzip".to_string()),
        };
        self.pipeline.upload(repository, payload, checker).await
    }

    async fn assets(&self) -> usize {
        self.metadata.list_assets(REPO).await.unwrap().len()
    }

    /// Files under the object store root, staging files included.
    fn stored_files(&self) -> usize {
        count_files(&self.storage_path)
    }

    fn assert_temp_released(&self) {
        assert_eq!(self.pipeline.temp_store().live_blobs(), 0);
        assert_eq!(std::fs::read_dir(&self.temp_path).unwrap().count(), 0);
    }
}

#[tokio::test]
async fn test_gate_checks_resolved_path_once() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();

    let response = harness
        .upload("whatever.tgz", chart_archive("mychart", "1.2.3"), &checker)
        .await
        .unwrap();

    assert_eq!(response.path, "mychart-1.2.3.tgz");
    assert_eq!(response.kind, AssetKind::PrimaryArchive);
    let calls = checker.calls();
    assert_eq!(calls.len(), 1);
    let (scope, action) = &calls[0];
    assert_eq!(*action, Action::Write);
    assert_eq!(scope.repository, REPO);
    assert_eq!(scope.format, HELM_FORMAT);
    assert_eq!(scope.path, "mychart-1.2.3.tgz");
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_denied_upload_never_commits() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::denying();

    let err = harness
        .upload("chart.tgz", chart_archive("chart", "0.1.0"), &checker)
        .await
        .unwrap_err();

    match err {
        UploadError::PermissionDenied { repository, path } => {
            assert_eq!(repository, REPO);
            assert_eq!(path, "chart-0.1.0.tgz");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(checker.calls().len(), 1);
    assert_eq!(harness.assets().await, 0);
    assert!(
        !harness
            .storage
            .exists(&blob_key_for(&chart_archive("chart", "0.1.0")))
            .await
            .unwrap()
    );
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_validation_failure_skips_permission_check() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();

    let err = harness
        .upload("badchart.tgz", chart_archive("badchart", ""), &checker)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "validation_error");
    assert!(checker.calls().is_empty());
    assert_eq!(harness.assets().await, 0);
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_unsupported_extension_skips_extraction_and_gate() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();

    let err = harness
        .upload("notes.txt", Bytes::from_static(b"hello"), &checker)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::UnsupportedInput(ref ext) if ext == ".txt"));
    assert!(checker.calls().is_empty());
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_provenance_gate_scope_uses_signature_path() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();

    let response = harness
        .upload("mychart-1.2.3.tgz.prov", provenance("mychart", "1.2.3"), &checker)
        .await
        .unwrap();

    assert_eq!(response.kind, AssetKind::DetachedSignature);
    assert_eq!(checker.calls()[0].0.path, "mychart-1.2.3.tgz.prov");
}

#[tokio::test]
async fn test_payload_limit_releases_temp_blob() {
    let harness = Harness::build(Some(16), |storage| storage).await;
    let checker = RecordingChecker::allowing();

    let err = harness
        .upload("mychart-1.2.3.tgz", chart_archive("mychart", "1.2.3"), &checker)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::Io(StorageError::PayloadTooLarge { limit: 16 })
    ));
    assert!(checker.calls().is_empty());
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_client_stream_error_is_io_error() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();

    let payload = UploadPayload {
        stream: stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "client went away",
            )),
        ]),
        filename: Some("mychart-1.2.3.tgz".to_string()),
        content_type: None,
    };
    let err = harness
        .pipeline
        .upload(REPO, payload, &checker)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "io_error");
    assert_eq!(harness.assets().await, 0);
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_blob_write_failure_commits_nothing() {
    let mut failing = None;
    let harness = Harness::build(None, |storage| {
        let store = Arc::new(FailingStore::new(storage));
        failing = Some(store.clone());
        store as Arc<dyn ObjectStore>
    })
    .await;
    let failing = failing.unwrap();
    let checker = RecordingChecker::allowing();
    let data = chart_archive("mychart", "1.2.3");

    let err = harness
        .upload("mychart-1.2.3.tgz", data.clone(), &checker)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "io_error");
    assert_eq!(failing.put_streams.load(Ordering::SeqCst), 1);
    assert!(!harness.storage.exists(&blob_key_for(&data)).await.unwrap());
    assert_eq!(harness.assets().await, 0);
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_commit_failure_removes_written_blob() {
    let harness = Harness::new().await;
    sqlx::query(
        "CREATE TRIGGER reject_asset_insert BEFORE INSERT ON assets \
         BEGIN SELECT RAISE(ABORT, 'asset writes disabled'); END",
    )
    .execute(harness.sqlite.pool())
    .await
    .unwrap();
    let checker = RecordingChecker::allowing();
    let data = chart_archive("mychart", "1.2.3");

    let err = harness
        .upload("mychart-1.2.3.tgz", data.clone(), &checker)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "commit_error");
    assert_eq!(harness.assets().await, 0);
    assert!(!harness.storage.exists(&blob_key_for(&data)).await.unwrap());
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_commit_failure_keeps_existing_blob() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();
    let data = chart_archive("mychart", "1.2.3");
    harness
        .upload("mychart-1.2.3.tgz", data.clone(), &checker)
        .await
        .unwrap();

    sqlx::query(
        "CREATE TRIGGER reject_asset_update BEFORE UPDATE ON assets \
         BEGIN SELECT RAISE(ABORT, 'asset writes disabled'); END",
    )
    .execute(harness.sqlite.pool())
    .await
    .unwrap();

    let err = harness
        .upload("mychart-1.2.3.tgz", data.clone(), &checker)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "commit_error");
    assert_eq!(harness.assets().await, 1);
    assert!(harness.storage.exists(&blob_key_for(&data)).await.unwrap());
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_identical_uploads_reuse_blob() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();
    let data = chart_archive("mychart", "1.2.3");

    let first = harness
        .upload("mychart-1.2.3.tgz", data.clone(), &checker)
        .await
        .unwrap();
    let second = harness
        .upload("mychart-1.2.3.tgz", data.clone(), &checker)
        .await
        .unwrap();

    assert_eq!(first.path, second.path);
    assert_eq!(first.sha256, sha256_hash(&data));
    assert_eq!(harness.assets().await, 1);
    assert_eq!(
        harness
            .metadata
            .count_blob_references(&blob_key_for(&data))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_concurrent_identical_uploads() {
    let harness = Arc::new(Harness::new().await);
    let data = chart_archive("mychart", "1.2.3");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let harness = harness.clone();
        let data = data.clone();
        handles.push(tokio::spawn(async move {
            let checker = RecordingChecker::allowing();
            harness.upload("mychart-1.2.3.tgz", data, &checker).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(harness.assets().await, 1);
    assert!(harness.storage.exists(&blob_key_for(&data)).await.unwrap());
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_commit_records_declared_payload_and_digests() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();
    let data = chart_archive("mychart", "1.2.3");

    harness
        .upload("upload.tgz", data.clone(), &checker)
        .await
        .unwrap();

    let row = harness
        .metadata
        .get_asset(REPO, "mychart-1.2.3.tgz")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.declared_filename.as_deref(), Some("upload.tgz"));
    assert_eq!(row.declared_content_type.as_deref(), Some("application/gzip"));
    assert_eq!(row.sha256, sha256_hash(&data));
    let expected_sha512: String = Sha512::digest(&data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    assert_eq!(row.sha512, Some(expected_sha512));
}

#[tokio::test]
async fn test_blob_write_does_not_block_other_uploads() {
    let mut stalling = None;
    let harness = Harness::build(None, |storage| {
        let store = Arc::new(StallingStore::new(storage));
        stalling = Some(store.clone());
        store as Arc<dyn ObjectStore>
    })
    .await;
    let stalling = stalling.unwrap();
    let harness = Arc::new(harness);

    let first = {
        let harness = harness.clone();
        tokio::spawn(async move {
            let checker = RecordingChecker::allowing();
            harness
                .upload("alpha-1.0.0.tgz", chart_archive("alpha", "1.0.0"), &checker)
                .await
        })
    };
    stalling.stalled().await;

    let listed = tokio::time::timeout(Duration::from_secs(1), harness.metadata.list_assets("other"))
        .await
        .expect("metadata reads should not wait for a blob write")
        .unwrap();
    assert!(listed.is_empty());

    let checker = RecordingChecker::allowing();
    let second = tokio::time::timeout(
        Duration::from_secs(5),
        harness.upload_to("other", "beta-2.0.0.tgz", chart_archive("beta", "2.0.0"), &checker),
    )
    .await
    .expect("upload to another path should not wait for a blob write")
    .unwrap();
    assert_eq!(second.path, "beta-2.0.0.tgz");
    assert!(!first.is_finished());

    stalling.release();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.path, "alpha-1.0.0.tgz");
    assert_eq!(harness.assets().await, 1);
    harness.assert_temp_released();
}

#[tokio::test]
async fn test_cancelled_upload_releases_temp_blob() {
    let harness = Harness::new().await;
    let checker = RecordingChecker::allowing();

    // Client stops sending mid-intake.
    let payload = UploadPayload {
        stream: stream::iter([Ok::<_, Infallible>(Bytes::from_static(b"partial"))])
            .chain(stream::pending()),
        filename: Some("mychart-1.2.3.tgz".to_string()),
        content_type: None,
    };
    let result = tokio::time::timeout(
        Duration::from_millis(100),
        harness.pipeline.upload(REPO, payload, &checker),
    )
    .await;

    assert!(result.is_err(), "intake should still be waiting");
    assert!(checker.calls().is_empty());
    harness.assert_temp_released();
    assert_eq!(harness.assets().await, 0);
}

#[tokio::test]
async fn test_cancelled_commit_leaves_nothing_behind() {
    let mut stalling = None;
    let harness = Harness::build(None, |storage| {
        let store = Arc::new(StallingStore::new(storage));
        stalling = Some(store.clone());
        store as Arc<dyn ObjectStore>
    })
    .await;
    let stalling = stalling.unwrap();
    let checker = RecordingChecker::allowing();

    let upload = harness.upload("mychart-1.2.3.tgz", chart_archive("mychart", "1.2.3"), &checker);
    let result = tokio::select! {
        result = upload => Some(result),
        _ = stalling.stalled() => None,
    };

    assert!(result.is_none(), "commit should have been held");
    assert_eq!(checker.calls().len(), 1);
    harness.assert_temp_released();
    assert_eq!(harness.assets().await, 0);
    assert_eq!(harness.stored_files(), 0);
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}

fn blob_key_for(data: &[u8]) -> String {
    chartvault_storage::blob_key(&chartvault_core::ContentHash::compute(data))
}
