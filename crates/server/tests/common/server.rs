//! Server test utilities.

use super::fixtures::{multipart_body, sha256_hash};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use chartvault_core::config::{AdminConfig, AppConfig, MetadataConfig, ServerConfig, StorageConfig};
use chartvault_core::upload::ASSET_FIELD;
use chartvault_metadata::models::TokenRow;
use chartvault_metadata::{MetadataStore, SqliteStore};
use chartvault_server::bootstrap::ensure_admin_token;
use chartvault_server::{AppState, create_router};
use chartvault_storage::{FilesystemBackend, ObjectStore, TempStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// Raw bearer token matching [`AdminConfig::for_testing`].
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub sqlite: Arc<SqliteStore>,
    storage_path: PathBuf,
    temp_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("storage");
        let temp_path = temp_dir.path().join("uploads");
        let db_path = temp_dir.path().join("metadata.db");

        let mut config = AppConfig {
            server: ServerConfig {
                temp_dir: Some(temp_path.clone()),
                ..Default::default()
            },
            storage: StorageConfig::Filesystem {
                path: storage_path.clone(),
            },
            metadata: MetadataConfig::Sqlite {
                path: db_path.clone(),
                query_timeout_secs: None,
            },
            admin: AdminConfig::for_testing(),
        };
        modifier(&mut config);

        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let sqlite = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );
        let metadata: Arc<dyn MetadataStore> = sqlite.clone();

        ensure_admin_token(metadata.as_ref(), &config.admin)
            .await
            .expect("Failed to create admin token");

        let temp_path = config.server.temp_dir.clone().unwrap_or(temp_path);
        let temp_store = TempStore::new(&temp_path, config.server.max_upload_size)
            .await
            .expect("Failed to create temp store");

        let state = AppState::new(config, storage, metadata, temp_store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            sqlite,
            storage_path,
            temp_path,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Create a token with the given JSON scope list and return its raw value.
    pub async fn create_token(&self, repository: Option<&str>, scopes: &str) -> String {
        let raw_token = format!("test-token-{}", Uuid::new_v4());
        let token = TokenRow {
            token_id: Uuid::new_v4(),
            repository: repository.map(str::to_string),
            token_hash: sha256_hash(raw_token.as_bytes()),
            scopes: scopes.to_string(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            last_used_at: None,
            description: Some("Test Token".to_string()),
        };
        self.metadata()
            .create_token(&token)
            .await
            .expect("Failed to create token");
        raw_token
    }

    /// Upload `data` as the asset part of a multipart request.
    pub async fn upload(
        &self,
        token: Option<&str>,
        repository: &str,
        filename: Option<&str>,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let (content_type, body) = multipart_body(ASSET_FIELD, filename, data);
        self.upload_raw(token, repository, &content_type, body).await
    }

    /// Post an already encoded multipart body to the upload endpoint.
    pub async fn upload_raw(
        &self,
        token: Option<&str>,
        repository: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/v1/repositories/{repository}/upload"))
            .header("Content-Type", content_type);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body)).unwrap();
        let (status, bytes) = self.send(request).await;
        (status, parse_json(&bytes))
    }

    /// Issue a GET and decode the body as JSON.
    pub async fn get_json(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let (status, bytes) = self.get(uri, token).await;
        (status, parse_json(&bytes))
    }

    /// Issue a GET and return the raw body.
    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Bytes) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    /// Number of blob objects in the object store.
    pub fn blob_count(&self) -> usize {
        count_files(&self.storage_path.join("blobs"))
    }

    /// Number of temp blobs not yet released.
    pub fn live_temp_blobs(&self) -> usize {
        self.state.temp_store().live_blobs()
    }

    /// Number of entries left in the upload temp directory.
    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(&self.temp_path)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Assert that no upload left anything behind in the temp area.
    pub fn assert_temp_released(&self) {
        assert_eq!(self.live_temp_blobs(), 0, "temp blob still live");
        assert_eq!(self.temp_entries(), 0, "temp directory not empty");
    }
}

fn parse_json(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes).unwrap_or(Value::Null)
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}
