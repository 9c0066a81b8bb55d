//! Mock collaborators for pipeline tests.

use async_trait::async_trait;
use bytes::Bytes;
use chartvault_core::{Action, ContentScope, PermissionChecker};
use chartvault_storage::{ByteStream, ObjectStore, StorageError, StorageResult, StreamingUpload};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Permission checker that records every call and answers with a fixed decision.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingChecker {
    allow: bool,
    calls: Mutex<Vec<(ContentScope, Action)>>,
}

#[allow(dead_code)]
impl RecordingChecker {
    pub fn allowing() -> Self {
        Self {
            allow: true,
            ..Default::default()
        }
    }

    pub fn denying() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(ContentScope, Action)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PermissionChecker for RecordingChecker {
    fn permitted(&self, scope: &ContentScope, action: Action) -> bool {
        self.calls.lock().unwrap().push((scope.clone(), action));
        self.allow
    }
}

/// Object store wrapper whose writes always fail. Reads and deletes pass
/// through to the wrapped store and are counted.
#[allow(dead_code)]
pub struct FailingStore {
    inner: Arc<dyn ObjectStore>,
    pub put_streams: AtomicUsize,
    pub deletes: AtomicUsize,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            put_streams: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        self.put_streams.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.put_stream(key).await?;
        Ok(Box::new(FailingUpload { inner }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

struct FailingUpload {
    inner: Box<dyn StreamingUpload>,
}

#[async_trait]
impl StreamingUpload for FailingUpload {
    async fn write(&mut self, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.inner.abort().await
    }
}

/// Object store wrapper that holds the first streaming upload open at
/// `finish` until [`StallingStore::release`] is called. Later uploads pass
/// straight through.
#[allow(dead_code)]
pub struct StallingStore {
    inner: Arc<dyn ObjectStore>,
    armed: AtomicBool,
    entered: Arc<Notify>,
    released: Arc<Notify>,
}

#[allow(dead_code)]
impl StallingStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            entered: Arc::new(Notify::new()),
            released: Arc::new(Notify::new()),
        }
    }

    /// Wait until the held upload has reached `finish`.
    pub async fn stalled(&self) {
        self.entered.notified().await;
    }

    /// Let the held upload finish.
    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl ObjectStore for StallingStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let inner = self.inner.put_stream(key).await?;
        if !self.armed.swap(false, Ordering::SeqCst) {
            return Ok(inner);
        }
        Ok(Box::new(StalledUpload {
            inner,
            entered: self.entered.clone(),
            released: self.released.clone(),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "stalling"
    }
}

struct StalledUpload {
    inner: Box<dyn StreamingUpload>,
    entered: Arc<Notify>,
    released: Arc<Notify>,
}

#[async_trait]
impl StreamingUpload for StalledUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.inner.write(data).await
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        self.entered.notify_one();
        self.released.notified().await;
        self.inner.finish().await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.inner.abort().await
    }
}
