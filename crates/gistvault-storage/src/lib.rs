//! Remote collection backend abstraction for `gistvault`.
//!
//! This crate defines the [`CollectionBackend`] trait — an interface to a
//! service that stores named collections of text files (a GitHub "gist" is
//! the canonical example). It knows nothing about keys, encryption, or
//! secrets: the vault in `gistvault-core` encrypts everything before it
//! reaches this layer and treats filenames as opaque.
//!
//! Implementations:
//!
//! - [`GistBackend`] — the GitHub Gist REST API (feature `github-backend`)
//! - [`MemoryBackend`] — in-memory, for testing only
//!
//! [`ObservedBackend`] wraps any backend and reports each call to a
//! [`RequestObserver`], which is how front ends drive progress indicators.

use std::collections::BTreeMap;

mod error;
#[cfg(feature = "github-backend")]
mod gist;
mod memory;
mod observe;

pub use error::StorageError;
#[cfg(feature = "github-backend")]
pub use gist::{DEFAULT_API_URL, GistBackend, GistConfig};
pub use memory::MemoryBackend;
pub use observe::{ObservedBackend, Operation, RequestObserver, TracingObserver};

/// A reference to one file inside a remote collection.
///
/// The content is not included; fetch it with
/// [`CollectionBackend::fetch_file_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Location the backend serves the raw file content from.
    pub raw_url: String,
}

/// A remote collection: an opaque id and its files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Collection {
    /// Backend-assigned collection id.
    pub id: String,
    /// Files in the collection, keyed by filename.
    pub files: BTreeMap<String, FileRef>,
}

impl Collection {
    /// Look up a file reference by name.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileRef> {
        self.files.get(name)
    }
}

/// New or replacement file contents, keyed by filename.
pub type FileContents = BTreeMap<String, String>;

/// A remote file-collection store.
///
/// All file contents are UTF-8 text. The backend provides no transactions:
/// an update replaces the named files as a whole and leaves other files in
/// the collection untouched.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait CollectionBackend: Send + Sync + 'static {
    /// List every collection visible to the account, in backend order.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend call fails.
    async fn list_collections(&self) -> Result<Vec<Collection>, StorageError>;

    /// Fetch one collection by id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the collection does not exist,
    /// or another [`StorageError`] if the backend call fails.
    async fn get_collection(&self, id: &str) -> Result<Collection, StorageError>;

    /// Fetch the raw content of a file.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend call fails.
    async fn fetch_file_content(&self, file: &FileRef) -> Result<Vec<u8>, StorageError>;

    /// Create a new collection holding the given files.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend call fails.
    async fn create_collection(&self, files: FileContents) -> Result<Collection, StorageError>;

    /// Create or replace the given files inside an existing collection.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend call fails.
    async fn update_collection(
        &self,
        id: &str,
        files: FileContents,
    ) -> Result<Collection, StorageError>;

    /// Delete a collection and all of its files.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend call fails.
    async fn delete_collection(&self, id: &str) -> Result<(), StorageError>;
}
