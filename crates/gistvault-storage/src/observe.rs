//! Request observation for collection backends.
//!
//! [`ObservedBackend`] is a decorator: it forwards every call to the wrapped
//! backend and reports the start and end of each one to a
//! [`RequestObserver`]. Front ends plug progress indicators in here instead
//! of patching the HTTP client.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::{Collection, CollectionBackend, FileContents, FileRef, StorageError};

/// The backend call being observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListCollections,
    GetCollection,
    FetchFile,
    CreateCollection,
    UpdateCollection,
    DeleteCollection,
}

impl Operation {
    /// Short, stable name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListCollections => "list_collections",
            Self::GetCollection => "get_collection",
            Self::FetchFile => "fetch_file",
            Self::CreateCollection => "create_collection",
            Self::UpdateCollection => "update_collection",
            Self::DeleteCollection => "delete_collection",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives a notification around every backend call.
pub trait RequestObserver: Send + Sync + 'static {
    /// A call is about to be issued.
    fn started(&self, op: Operation);

    /// A call finished, successfully or not.
    fn finished(&self, op: Operation, elapsed: Duration, ok: bool);
}

/// Observer that emits a `tracing` debug event per finished call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn started(&self, _op: Operation) {}

    fn finished(&self, op: Operation, elapsed: Duration, ok: bool) {
        debug!(
            operation = %op,
            elapsed_ms = elapsed.as_millis(),
            ok,
            "backend request finished"
        );
    }
}

/// A backend decorator that reports each call to an observer.
pub struct ObservedBackend<B> {
    inner: B,
    observer: Arc<dyn RequestObserver>,
}

impl<B> ObservedBackend<B> {
    /// Wrap `inner`, reporting to `observer`.
    pub fn new(inner: B, observer: Arc<dyn RequestObserver>) -> Self {
        Self { inner, observer }
    }

    /// Borrow the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn observe<T, F>(&self, op: Operation, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        self.observer.started(op);
        let start = Instant::now();
        let result = call.await;
        self.observer.finished(op, start.elapsed(), result.is_ok());
        result
    }
}

impl<B: fmt::Debug> fmt::Debug for ObservedBackend<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedBackend")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<B: CollectionBackend> CollectionBackend for ObservedBackend<B> {
    async fn list_collections(&self) -> Result<Vec<Collection>, StorageError> {
        self.observe(Operation::ListCollections, self.inner.list_collections())
            .await
    }

    async fn get_collection(&self, id: &str) -> Result<Collection, StorageError> {
        self.observe(Operation::GetCollection, self.inner.get_collection(id))
            .await
    }

    async fn fetch_file_content(&self, file: &FileRef) -> Result<Vec<u8>, StorageError> {
        self.observe(Operation::FetchFile, self.inner.fetch_file_content(file))
            .await
    }

    async fn create_collection(&self, files: FileContents) -> Result<Collection, StorageError> {
        self.observe(
            Operation::CreateCollection,
            self.inner.create_collection(files),
        )
        .await
    }

    async fn update_collection(
        &self,
        id: &str,
        files: FileContents,
    ) -> Result<Collection, StorageError> {
        self.observe(
            Operation::UpdateCollection,
            self.inner.update_collection(id, files),
        )
        .await
    }

    async fn delete_collection(&self, id: &str) -> Result<(), StorageError> {
        self.observe(
            Operation::DeleteCollection,
            self.inner.delete_collection(id),
        )
        .await
    }
}
