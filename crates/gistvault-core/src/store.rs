//! The vault: tag-addressed secrets in encrypted shard files.
//!
//! A [`Vault`] owns everything derived from the key (partitioner, memoized
//! bootstrap state) and talks to the backend through a shared
//! [`CollectionBackend`]. All operations first await [`Vault::ready`], which
//! locates or creates the vault's collection exactly once per instance.
//!
//! Each shard is one JSON object mapping record keys to encrypted
//! `[secret, tags]` pairs. Writes are read-modify-write over the whole
//! shard; writers on the same vault instance are serialized per shard.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use gistvault_storage::{Collection, CollectionBackend};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::bootstrap::{self, Settings, VaultState};
use crate::codec;
use crate::crypto::{self, CiphertextPair, VaultKey};
use crate::error::{CryptoError, VaultError};
use crate::partition::{Partitioner, TagIdentity, normalize_tags};
use crate::site::SiteTags;

/// Reserved first tag for secure notes.
pub const SECURE_NOTE_PREFIX: &str = "__";

/// What a read does with an entry that fails to decrypt or parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPolicy {
    /// Fail the whole read.
    #[default]
    Abort,
    /// Log a warning and leave the entry out of the results.
    Skip,
}

/// Behavior switches for a [`Vault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VaultOptions {
    pub tag_identity: TagIdentity,
    pub entry_policy: EntryPolicy,
}

/// One decrypted secret and how well its tags matched the query.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SecretMatch {
    pub secret: String,
    pub tags: Vec<String>,
    /// Number of query tags (duplicates counted) found in `tags`.
    pub matches: usize,
}

impl fmt::Debug for SecretMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMatch")
            .field("secret", &"[REDACTED]")
            .field("tags", &self.tags)
            .field("matches", &self.matches)
            .finish()
    }
}

/// An encrypted, tag-addressed secret store on a remote collection backend.
pub struct Vault {
    backend: Arc<dyn CollectionBackend>,
    key: VaultKey,
    partitioner: Partitioner,
    options: VaultOptions,
    state: OnceCell<VaultState>,
    shard_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Vault {
    /// Create a vault handle. No backend call is made until first use.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CollectionBackend>,
        username: impl Into<String>,
        key: VaultKey,
        options: VaultOptions,
    ) -> Self {
        let partitioner = Partitioner::new(username, key.clone(), options.tag_identity);
        Self {
            backend,
            key,
            partitioner,
            options,
            state: OnceCell::new(),
            shard_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The key this vault was opened with.
    #[must_use]
    pub fn key(&self) -> &VaultKey {
        &self.key
    }

    /// Locate or create the vault's collection.
    ///
    /// Runs discovery at most once per instance; concurrent callers share
    /// the in-flight attempt. A failed attempt is not remembered, so the next
    /// call tries again.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Bootstrap`] if discovery or creation fails.
    pub async fn ready(&self) -> Result<&VaultState, VaultError> {
        self.state
            .get_or_try_init(|| bootstrap::bootstrap(&*self.backend, &self.key))
            .await
            .map_err(VaultError::Bootstrap)
    }

    /// The id of the collection holding this vault.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Bootstrap`] if the vault cannot be located.
    pub async fn collection_id(&self) -> Result<&str, VaultError> {
        Ok(&self.ready().await?.collection_id)
    }

    /// The vault's settings record.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Bootstrap`] if the vault cannot be located.
    pub async fn settings(&self) -> Result<&Settings, VaultError> {
        Ok(&self.ready().await?.settings)
    }

    /// Store `secret` under `tags`, replacing any secret stored under the
    /// same tags. Empty `tags` means `["_"]`.
    ///
    /// Returns the backend's view of the collection after the write.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Bootstrap`] if the vault cannot be located.
    /// - [`VaultError::MalformedRecord`] if the existing shard is not a JSON
    ///   object; it is left untouched.
    /// - [`VaultError::Storage`] if a backend call fails.
    pub async fn set_secret(&self, secret: &str, tags: &[String]) -> Result<Collection, VaultError> {
        let tags = normalize_tags(tags);
        let collection_id = self.collection_id().await?;
        let file = self.partitioner.shard_filename(&tags)?;
        let record_key = self.partitioner.record_key(&tags)?;

        let lock = self.shard_lock(&file).await;
        let guard = lock.lock().await;
        let written = self
            .write_entry(collection_id, &file, record_key, secret, &tags)
            .await;
        drop(guard);
        self.release_shard_lock(&file, lock).await;

        written
    }

    /// Every secret in the partition of `tags[0]`, best match first.
    ///
    /// Returns `None` when nothing has ever been stored in that partition.
    /// Entries with equal scores keep their shard order; entries that match
    /// no query tag are still returned.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Bootstrap`] if the vault cannot be located.
    /// - [`VaultError::AuthenticationFailed`] or
    ///   [`VaultError::MalformedRecord`] for an unreadable entry, unless the
    ///   vault uses [`EntryPolicy::Skip`].
    /// - [`VaultError::Storage`] if a backend call fails.
    pub async fn get_secrets(&self, tags: &[String]) -> Result<Option<Vec<SecretMatch>>, VaultError> {
        let tags = normalize_tags(tags);
        let collection_id = self.collection_id().await?;
        let file = self.partitioner.shard_filename(&tags)?;

        let Some(shard) = self.load_shard(collection_id, &file).await? else {
            debug!(file = %file, "no shard for partition");
            return Ok(None);
        };

        let mut results = Vec::with_capacity(shard.len());
        for (record_key, value) in &shard {
            match self.open_entry(&file, record_key, value) {
                Ok((secret, stored)) => {
                    let matches = tags.iter().filter(|tag| stored.contains(tag)).count();
                    results.push(SecretMatch {
                        secret,
                        tags: stored,
                        matches,
                    });
                }
                Err(e) if self.options.entry_policy == EntryPolicy::Skip => {
                    warn!(file = %file, record_key = %record_key, error = %e, "skipping unreadable entry");
                }
                Err(e) => return Err(e),
            }
        }

        results.sort_by(|a, b| b.matches.cmp(&a.matches));
        Ok(Some(results))
    }

    /// Store a password for an account on a site.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidUrl`] for an unusable URL, otherwise as
    /// [`Vault::set_secret`].
    pub async fn set_password(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<Collection, VaultError> {
        let site = SiteTags::parse(url)?;
        self.set_secret(password, &site.set_tags(username)).await
    }

    /// Passwords stored for a site, the best match for `username` first.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidUrl`] for an unusable URL, otherwise as
    /// [`Vault::get_secrets`].
    pub async fn get_passwords(
        &self,
        url: &str,
        username: &str,
    ) -> Result<Option<Vec<SecretMatch>>, VaultError> {
        let site = SiteTags::parse(url)?;
        self.get_secrets(&site.query_tags(username)).await
    }

    /// Store a secure note under `tags`.
    ///
    /// # Errors
    ///
    /// As [`Vault::set_secret`].
    pub async fn set_note(&self, note: &str, tags: &[String]) -> Result<Collection, VaultError> {
        self.set_secret(note, &note_tags(tags)).await
    }

    /// Secure notes ranked against `tags`.
    ///
    /// # Errors
    ///
    /// As [`Vault::get_secrets`].
    pub async fn get_notes(&self, tags: &[String]) -> Result<Option<Vec<SecretMatch>>, VaultError> {
        self.get_secrets(&note_tags(tags)).await
    }

    async fn shard_lock(&self, file: &str) -> Arc<Mutex<()>> {
        let mut locks = self.shard_locks.lock().await;
        Arc::clone(locks.entry(file.to_owned()).or_default())
    }

    /// Drop this writer's handle and forget the lock once no other writer
    /// holds or awaits it.
    async fn release_shard_lock(&self, file: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.shard_locks.lock().await;
        drop(lock);
        if locks.get(file).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(file);
        }
    }

    /// Read-modify-write of one shard entry. Callers hold the shard lock.
    async fn write_entry(
        &self,
        collection_id: &str,
        file: &str,
        record_key: String,
        secret: &str,
        tags: &[String],
    ) -> Result<Collection, VaultError> {
        let mut shard = self
            .load_shard(collection_id, file)
            .await?
            .unwrap_or_default();

        let plaintext = Zeroizing::new(serde_json::to_string(&(secret, tags)).map_err(|e| {
            VaultError::Serialization {
                what: "secret",
                reason: e.to_string(),
            }
        })?);
        let entry = crypto::encrypt(&plaintext, &self.key)?;
        let entry = serde_json::to_value(entry).map_err(|e| VaultError::Serialization {
            what: "entry",
            reason: e.to_string(),
        })?;
        shard.insert(record_key, entry);

        let content = codec::to_file_json(&shard).map_err(|e| VaultError::Serialization {
            what: "shard",
            reason: e.to_string(),
        })?;
        let updated = self
            .backend
            .update_collection(collection_id, BTreeMap::from([(file.to_owned(), content)]))
            .await?;

        debug!(file = %file, entries = shard.len(), "shard written");
        Ok(updated)
    }

    async fn load_shard(
        &self,
        collection_id: &str,
        file: &str,
    ) -> Result<Option<Map<String, Value>>, VaultError> {
        let collection = self.backend.get_collection(collection_id).await?;
        let Some(file_ref) = collection.file(file) else {
            return Ok(None);
        };

        let content = self.backend.fetch_file_content(file_ref).await?;
        match serde_json::from_slice(&content) {
            Ok(Value::Object(shard)) => Ok(Some(shard)),
            Ok(_) => Err(VaultError::MalformedRecord {
                file: file.to_owned(),
                reason: "shard is not a JSON object".to_owned(),
            }),
            Err(e) => Err(VaultError::MalformedRecord {
                file: file.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    fn open_entry(
        &self,
        file: &str,
        record_key: &str,
        value: &Value,
    ) -> Result<(String, Vec<String>), VaultError> {
        let malformed = |reason: String| VaultError::MalformedRecord {
            file: file.to_owned(),
            reason: format!("entry '{record_key}': {reason}"),
        };

        let pair = CiphertextPair::deserialize(value).map_err(|e| malformed(e.to_string()))?;
        let plaintext = crypto::decrypt(&pair, &self.key)
            .map(Zeroizing::new)
            .map_err(|e| match e {
                CryptoError::AuthenticationFailed => VaultError::AuthenticationFailed {
                    file: file.to_owned(),
                    record_key: record_key.to_owned(),
                },
                other => malformed(other.to_string()),
            })?;

        serde_json::from_str(&plaintext).map_err(|e| malformed(e.to_string()))
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("partitioner", &self.partitioner)
            .field("options", &self.options)
            .field("state", &self.state.get().map(|s| &s.collection_id))
            .finish_non_exhaustive()
    }
}

fn note_tags(tags: &[String]) -> Vec<String> {
    std::iter::once(SECURE_NOTE_PREFIX.to_owned())
        .chain(tags.iter().cloned())
        .collect()
}
