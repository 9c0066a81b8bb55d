//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AssetRepo, BootstrapRepo, TokenRepo};
use crate::tx::AssetTransaction;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: AssetRepo + TokenRepo + BootstrapRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Open a transaction for asset writes.
    async fn begin(&self) -> MetadataResult<Box<dyn AssetTransaction>>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    ///
    /// `query_timeout_secs` bounds how long an operation waits for the
    /// connection (default: 10 minutes).
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(600));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // A single connection serializes writers. Transactions must not span
        // object store I/O, or every other query waits on it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(query_timeout)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = query_timeout.as_secs(),
            "opened sqlite metadata store"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> MetadataResult<Box<dyn AssetTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteAssetTransaction { tx }))
    }
}

/// Transaction handle returned by [`SqliteStore::begin`].
struct SqliteAssetTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

const SELECT_ASSET: &str = "SELECT * FROM assets WHERE repository = ? AND path = ?";
const COUNT_BLOB_REFERENCES: &str = "SELECT COUNT(*) FROM assets WHERE blob_key = ?";

#[async_trait]
impl AssetTransaction for SqliteAssetTransaction {
    async fn upsert_asset(
        &mut self,
        asset: &crate::models::AssetRow,
    ) -> MetadataResult<crate::tx::UpsertOutcome> {
        let previous: Option<String> =
            sqlx::query_scalar("SELECT blob_key FROM assets WHERE repository = ? AND path = ?")
                .bind(&asset.repository)
                .bind(&asset.path)
                .fetch_optional(&mut *self.tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO assets (
                repository, path, kind, name, version, blob_key, sha256, sha512,
                size_bytes, content_type, declared_filename, declared_content_type,
                attributes_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repository, path) DO UPDATE SET
                kind = excluded.kind,
                name = excluded.name,
                version = excluded.version,
                blob_key = excluded.blob_key,
                sha256 = excluded.sha256,
                sha512 = excluded.sha512,
                size_bytes = excluded.size_bytes,
                content_type = excluded.content_type,
                declared_filename = excluded.declared_filename,
                declared_content_type = excluded.declared_content_type,
                attributes_json = excluded.attributes_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&asset.repository)
        .bind(&asset.path)
        .bind(&asset.kind)
        .bind(&asset.name)
        .bind(&asset.version)
        .bind(&asset.blob_key)
        .bind(&asset.sha256)
        .bind(&asset.sha512)
        .bind(asset.size_bytes)
        .bind(&asset.content_type)
        .bind(&asset.declared_filename)
        .bind(&asset.declared_content_type)
        .bind(&asset.attributes_json)
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(match previous {
            None => crate::tx::UpsertOutcome::Created,
            Some(previous_blob_key) => crate::tx::UpsertOutcome::Replaced { previous_blob_key },
        })
    }

    async fn get_asset(
        &mut self,
        repository: &str,
        path: &str,
    ) -> MetadataResult<Option<crate::models::AssetRow>> {
        let row = sqlx::query_as::<_, crate::models::AssetRow>(SELECT_ASSET)
            .bind(repository)
            .bind(path)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn count_blob_references(&mut self, blob_key: &str) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar(COUNT_BLOB_REFERENCES)
            .bind(blob_key)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count as u64)
    }

    async fn commit(self: Box<Self>) -> MetadataResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MetadataResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl AssetRepo for SqliteStore {
        async fn get_asset(
            &self,
            repository: &str,
            path: &str,
        ) -> MetadataResult<Option<AssetRow>> {
            let row = sqlx::query_as::<_, AssetRow>(SELECT_ASSET)
                .bind(repository)
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_assets(&self, repository: &str) -> MetadataResult<Vec<AssetRow>> {
            let rows = sqlx::query_as::<_, AssetRow>(
                "SELECT * FROM assets WHERE repository = ? ORDER BY path",
            )
            .bind(repository)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_blob_references(&self, blob_key: &str) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(COUNT_BLOB_REFERENCES)
                .bind(blob_key)
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, repository, token_hash, scopes, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(&token.repository)
            .bind(&token.token_hash)
            .bind(&token.scopes)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE tokens SET revoked_at = ? WHERE token_id = ?")
                .bind(revoked_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("token {token_id}")));
            }
            Ok(())
        }

        async fn list_tokens(&self, repository: Option<&str>) -> MetadataResult<Vec<TokenRow>> {
            let rows = match repository {
                Some(repository) => {
                    sqlx::query_as::<_, TokenRow>(
                        "SELECT * FROM tokens WHERE repository = ? ORDER BY created_at DESC",
                    )
                    .bind(repository)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens ORDER BY created_at DESC")
                        .fetch_all(&self.pool)
                        .await?
                }
            };
            Ok(rows)
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> =
                sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Internal(format!(
                            "invalid bootstrap_token_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()
        }

        async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Committed chart and provenance assets; (repository, path) is the overwrite key
CREATE TABLE IF NOT EXISTS assets (
    repository TEXT NOT NULL,
    path TEXT NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    blob_key TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    sha512 TEXT,
    size_bytes INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    declared_filename TEXT,
    declared_content_type TEXT,
    attributes_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repository, path)
);
CREATE INDEX IF NOT EXISTS idx_assets_blob ON assets(blob_key);
CREATE INDEX IF NOT EXISTS idx_assets_chart ON assets(repository, name, version);

-- Tokens
CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    repository TEXT,
    token_hash TEXT NOT NULL UNIQUE,
    scopes TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_tokens_hash ON tokens(token_hash);

-- Bootstrap marker
CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id TEXT
);
"#;
