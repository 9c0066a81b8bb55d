//! Scoped temporary spooling of uploaded payloads.
//!
//! An upload is copied into a file under the temp directory while its digests
//! are computed. The resulting [`TempBlob`] can be read any number of times
//! and deletes its file when dropped, whatever the outcome of the upload.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use chartvault_core::{ContentHash, DigestSet, Digests, HashAlgorithm};
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Creates [`TempBlob`]s under one directory.
#[derive(Clone, Debug)]
pub struct TempStore {
    dir: PathBuf,
    max_size: Option<u64>,
    live: Arc<AtomicUsize>,
}

impl TempStore {
    /// Create a temp store rooted at `dir`, creating the directory if needed.
    pub async fn new(dir: impl AsRef<Path>, max_size: Option<u64>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            max_size,
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of blobs (including ones still being spooled) not yet released.
    pub fn live_blobs(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Spool a byte stream into a new temp blob, hashing it with `algorithms`.
    ///
    /// Fails with [`StorageError::PayloadTooLarge`] once more than the
    /// configured maximum has been received. On any failure, or if the
    /// returned future is dropped, the partial file is removed.
    #[instrument(skip(self, stream), fields(declared_name = declared_name.as_deref()))]
    pub async fn acquire<S, E>(
        &self,
        stream: S,
        declared_name: Option<String>,
        algorithms: &[HashAlgorithm],
    ) -> StorageResult<TempBlob>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut digests =
            DigestSet::new(algorithms).map_err(|e| StorageError::Config(e.to_string()))?;
        let guard = LiveGuard::new(self.live.clone());

        let named = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&self.dir)?;
        let (file, path) = named.into_parts();
        let mut file = fs::File::from_std(file);

        let mut size: u64 = 0;
        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
            size += chunk.len() as u64;
            if let Some(limit) = self.max_size
                && size > limit
            {
                return Err(StorageError::PayloadTooLarge { limit });
            }
            digests.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let digests = digests.finalize();
        debug!(size, sha256 = %digests.sha256, "spooled upload");

        Ok(TempBlob {
            path,
            size,
            digests,
            declared_name,
            _guard: guard,
        })
    }
}

/// Counts a blob as live until dropped.
#[derive(Debug)]
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A spooled, hashed copy of an uploaded payload.
///
/// Owned by a single upload. The backing file is deleted on drop.
#[derive(Debug)]
pub struct TempBlob {
    // Field order matters: the file is removed before the live count drops.
    path: TempPath,
    size: u64,
    digests: Digests,
    declared_name: Option<String>,
    _guard: LiveGuard,
}

impl TempBlob {
    /// Size of the payload in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Digests under the algorithms the blob was acquired with.
    pub fn digests(&self) -> &Digests {
        &self.digests
    }

    pub fn sha256(&self) -> &ContentHash {
        &self.digests.sha256
    }

    /// Filename declared by the uploader, if any.
    pub fn declared_name(&self) -> Option<&str> {
        self.declared_name.as_deref()
    }

    /// Location of the spooled file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh blocking reader positioned at the start.
    pub fn reader(&self) -> StorageResult<std::fs::File> {
        Ok(std::fs::File::open(&self.path)?)
    }

    /// Open a fresh async reader positioned at the start.
    pub async fn open(&self) -> StorageResult<fs::File> {
        Ok(fs::File::open(&self.path).await?)
    }
}
