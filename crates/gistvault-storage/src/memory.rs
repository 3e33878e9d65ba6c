//! In-memory collection backend for testing.
//!
//! Collections live in a `Vec` behind a `RwLock`, in creation order, so
//! listing order is deterministic. Nothing is persisted — all data is lost
//! when the process exits.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{Collection, CollectionBackend, FileContents, FileRef, StorageError};

const RAW_URL_SCHEME: &str = "memory://";

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    collections: Vec<(String, BTreeMap<String, String>)>,
}

/// An in-memory collection backend.
///
/// Cloning shares the underlying state. File references use
/// `memory://<collection id>/<filename>` URLs and always resolve to the
/// current content.
///
/// # Examples
///
/// ```
/// # use std::collections::BTreeMap;
/// # use gistvault_storage::{CollectionBackend, MemoryBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// let files = BTreeMap::from([("a.json".to_owned(), "{}".to_owned())]);
/// let created = backend.create_collection(files).await.unwrap();
/// let file = created.file("a.json").unwrap();
/// assert_eq!(backend.fetch_file_content(file).await.unwrap(), b"{}");
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collections currently stored.
    pub async fn collection_count(&self) -> usize {
        self.state.read().await.collections.len()
    }

    /// Read a file's content directly, bypassing file references.
    pub async fn file_content(&self, id: &str, filename: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .collections
            .iter()
            .find(|(cid, _)| cid == id)
            .and_then(|(_, files)| files.get(filename).cloned())
    }
}

fn describe(id: &str, files: &BTreeMap<String, String>) -> Collection {
    Collection {
        id: id.to_owned(),
        files: files
            .keys()
            .map(|name| {
                let raw_url = format!("{RAW_URL_SCHEME}{id}/{name}");
                (name.clone(), FileRef { raw_url })
            })
            .collect(),
    }
}

fn not_found(what: impl Into<String>) -> StorageError {
    StorageError::NotFound { what: what.into() }
}

#[async_trait::async_trait]
impl CollectionBackend for MemoryBackend {
    async fn list_collections(&self) -> Result<Vec<Collection>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .iter()
            .map(|(id, files)| describe(id, files))
            .collect())
    }

    async fn get_collection(&self, id: &str) -> Result<Collection, StorageError> {
        let state = self.state.read().await;
        state
            .collections
            .iter()
            .find(|(cid, _)| cid == id)
            .map(|(cid, files)| describe(cid, files))
            .ok_or_else(|| not_found(format!("collection '{id}'")))
    }

    async fn fetch_file_content(&self, file: &FileRef) -> Result<Vec<u8>, StorageError> {
        let (id, name) = file
            .raw_url
            .strip_prefix(RAW_URL_SCHEME)
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(|| not_found(format!("file '{}'", file.raw_url)))?;

        self.file_content(id, name)
            .await
            .map(String::into_bytes)
            .ok_or_else(|| not_found(format!("file '{}'", file.raw_url)))
    }

    async fn create_collection(&self, files: FileContents) -> Result<Collection, StorageError> {
        let mut state = self.state.write().await;
        state.next_id = state.next_id.saturating_add(1);
        let id = format!("mem-{:04}", state.next_id);
        let created = describe(&id, &files);
        state.collections.push((id, files));
        Ok(created)
    }

    async fn update_collection(
        &self,
        id: &str,
        files: FileContents,
    ) -> Result<Collection, StorageError> {
        let mut state = self.state.write().await;
        let (cid, existing) = state
            .collections
            .iter_mut()
            .find(|(cid, _)| cid == id)
            .ok_or_else(|| not_found(format!("collection '{id}'")))?;
        existing.extend(files);
        Ok(describe(cid, existing))
    }

    async fn delete_collection(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let before = state.collections.len();
        state.collections.retain(|(cid, _)| cid != id);
        if state.collections.len() == before {
            return Err(not_found(format!("collection '{id}'")));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> FileContents {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn empty_backend_lists_nothing() {
        let backend = MemoryBackend::new();
        assert!(backend.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_then_fetch_file() {
        let backend = MemoryBackend::new();
        let created = backend
            .create_collection(files(&[("settings.json", "{\"a\":1}")]))
            .await
            .unwrap();

        let file = created.file("settings.json").unwrap();
        let content = backend.fetch_file_content(file).await.unwrap();
        assert_eq!(content, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn list_preserves_creation_order() {
        let backend = MemoryBackend::new();
        let first = backend.create_collection(files(&[("a", "1")])).await.unwrap();
        let second = backend.create_collection(files(&[("b", "2")])).await.unwrap();

        let ids: Vec<String> = backend
            .list_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn update_adds_and_replaces_files() {
        let backend = MemoryBackend::new();
        let created = backend.create_collection(files(&[("a", "1")])).await.unwrap();

        let updated = backend
            .update_collection(&created.id, files(&[("a", "2"), ("b", "3")]))
            .await
            .unwrap();
        assert_eq!(updated.files.len(), 2);
        assert_eq!(
            backend.file_content(&created.id, "a").await.as_deref(),
            Some("2")
        );
        assert_eq!(
            backend.file_content(&created.id, "b").await.as_deref(),
            Some("3")
        );
    }

    #[tokio::test]
    async fn update_unknown_collection_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend
            .update_collection("nope", files(&[("a", "1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn get_collection_by_id() {
        let backend = MemoryBackend::new();
        let created = backend.create_collection(files(&[("a", "1")])).await.unwrap();
        let fetched = backend.get_collection(&created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn delete_removes_collection() {
        let backend = MemoryBackend::new();
        let created = backend.create_collection(files(&[("a", "1")])).await.unwrap();
        backend.delete_collection(&created.id).await.unwrap();
        assert_eq!(backend.collection_count().await, 0);

        let err = backend.delete_collection(&created.id).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn fetch_unknown_file_is_not_found() {
        let backend = MemoryBackend::new();
        let bogus = FileRef {
            raw_url: "memory://mem-0001/missing.json".to_owned(),
        };
        let err = backend.fetch_file_content(&bogus).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.create_collection(files(&[("a", "1")])).await.unwrap();
        assert_eq!(clone.collection_count().await, 1);
    }
}
