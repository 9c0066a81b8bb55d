//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem object store.
///
/// Objects are written to a uniquely named sibling file, fsynced, then renamed
/// into place, so readers never observe a partially written object.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a blob key to a path under the root.
    ///
    /// Runs the symlink checks on the blocking pool.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || resolve_key(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path).await.map_err(not_found_as(key))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let temp_path = staging_path(&path);
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemUpload {
            file: Some(file),
            temp_path: Some(temp_path),
            final_path: path,
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path).await.map_err(not_found_as(key))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root {} not accessible: {e}", self.root.display()),
            ))
        })?;
        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root {} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}

fn not_found_as(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Map a key to a path under `root`, refusing anything that could escape it.
///
/// Keys must be relative and made of plain components. The deepest entry of
/// the resulting path that already exists (the object itself, or its nearest
/// existing ancestor for new objects) must canonicalize to a location inside
/// the root, which rules out symlinks pointing elsewhere.
fn resolve_key(root: &Path, key: &str) -> StorageResult<PathBuf> {
    let relative = Path::new(key);
    let plain = !key.is_empty()
        && !key.contains("..")
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(StorageError::InvalidKey(format!(
            "path traversal not allowed: {key}"
        )));
    }

    let path = root.join(relative);
    let root_canonical = root.canonicalize()?;

    for existing in path.ancestors() {
        let meta = match std::fs::symlink_metadata(existing) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(StorageError::Io(e)),
        };
        let canonical = existing.canonicalize().map_err(|e| {
            if meta.file_type().is_symlink() {
                StorageError::InvalidKey(format!("dangling symlink in key: {key}"))
            } else {
                StorageError::Io(e)
            }
        })?;
        if !canonical.starts_with(&root_canonical) {
            return Err(StorageError::InvalidKey(format!(
                "resolved path escapes storage root: {key}"
            )));
        }
        break;
    }

    Ok(path)
}

/// Unique sibling path used while an object is being written.
///
/// Concurrent writers of the same key each get their own staging file; the
/// last rename wins.
fn staging_path(path: &Path) -> PathBuf {
    let suffix = format!(".tmp.{}", Uuid::new_v4());
    path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), suffix))
            .unwrap_or(suffix),
    )
}

/// Streaming upload for filesystem backend.
///
/// The staging file is removed on drop unless it was renamed into place.
struct FilesystemUpload {
    file: Option<fs::File>,
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    bytes_written: u64,
}

fn upload_closed() -> StorageError {
    StorageError::Io(std::io::Error::other("upload already closed"))
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let file = self.file.as_mut().ok_or_else(upload_closed)?;
        file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        let file = self.file.take().ok_or_else(upload_closed)?;
        // Ensure all data is flushed to disk before rename
        file.sync_all().await?;
        drop(file);
        let temp_path = self.temp_path.as_ref().ok_or_else(upload_closed)?;
        fs::rename(temp_path, &self.final_path).await?;
        self.temp_path = None;
        Ok(self.bytes_written)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.file = None;
        let Some(temp_path) = self.temp_path.take() else {
            return Ok(());
        };
        match fs::remove_file(&temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

impl Drop for FilesystemUpload {
    fn drop(&mut self) {
        if let Some(temp_path) = self.temp_path.take() {
            self.file = None;
            if let Err(e) = std::fs::remove_file(&temp_path)
                && e.kind() != ErrorKind::NotFound
            {
                tracing::warn!(
                    path = %temp_path.display(),
                    error = %e,
                    "failed to remove abandoned staging file"
                );
            }
        }
    }
}
