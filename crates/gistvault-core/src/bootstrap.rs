//! Vault discovery and creation.
//!
//! The backend has no notion of which collection belongs to which key. A
//! vault marks its collection with a settings file whose `test` field is a
//! known marker encrypted under the vault key; only the holder of the key
//! can recognize it. Discovery is a scan over every collection the account
//! can see:
//!
//! 1. Collections without the settings file are ignored.
//! 2. Settings that fail to parse, or whose marker does not decrypt to the
//!    expected value, belong to some other vault and are skipped.
//! 3. The first match in backend order wins and the scan stops.
//! 4. If nothing matches, a new collection holding only a fresh settings
//!    file is created.
//!
//! Backend failures abort the scan; they are never mistaken for "not our
//! vault".

use std::collections::BTreeMap;

use gistvault_storage::CollectionBackend;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::codec;
use crate::crypto::{self, CiphertextPair, VaultKey};
use crate::error::BootstrapError;

/// Reserved filename of the settings record.
pub const SETTINGS_FILE: &str = ".gistvault.json";

/// Plaintext of the settings marker.
pub const TEST_STRING: &str = "GISTVAULT";

/// The settings record stored in a vault's collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// The marker, encrypted under the vault key.
    pub test: CiphertextPair,
    /// Vault-level configuration, preserved as found.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    /// Fresh settings for a new vault.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Crypto`] if the marker cannot be encrypted.
    pub fn new(key: &VaultKey) -> Result<Self, BootstrapError> {
        Ok(Self {
            test: crypto::encrypt(TEST_STRING, key)?,
            extra: Map::new(),
        })
    }

    /// Whether the marker decrypts to [`TEST_STRING`] under `key`.
    #[must_use]
    pub fn belongs_to(&self, key: &VaultKey) -> bool {
        crypto::decrypt(&self.test, key).is_ok_and(|marker| marker == TEST_STRING)
    }
}

/// The resolved vault: its settings and the collection that holds it.
#[derive(Debug, Clone)]
pub struct VaultState {
    pub settings: Settings,
    pub collection_id: String,
}

/// Locate the collection belonging to `key`, creating one if none exists.
///
/// # Errors
///
/// - [`BootstrapError::Storage`] if listing, fetching, or creating fails.
/// - [`BootstrapError::Crypto`] or [`BootstrapError::Serialization`] if a
///   new settings record cannot be produced.
pub async fn bootstrap(
    backend: &dyn CollectionBackend,
    key: &VaultKey,
) -> Result<VaultState, BootstrapError> {
    let candidates = backend.list_collections().await?;
    debug!(count = candidates.len(), "scanning collections for vault settings");

    for candidate in candidates {
        let Some(file) = candidate.file(SETTINGS_FILE) else {
            continue;
        };

        let content = backend.fetch_file_content(file).await?;
        let settings: Settings = match serde_json::from_slice(&content) {
            Ok(settings) => settings,
            Err(e) => {
                debug!(collection = %candidate.id, error = %e, "skipping unparseable settings");
                continue;
            }
        };

        if settings.belongs_to(key) {
            info!(collection = %candidate.id, "found existing vault");
            return Ok(VaultState {
                settings,
                collection_id: candidate.id,
            });
        }

        debug!(collection = %candidate.id, "settings belong to another key");
    }

    let settings = Settings::new(key)?;
    let content = codec::to_file_json(&settings).map_err(|e| BootstrapError::Serialization {
        reason: e.to_string(),
    })?;
    let created = backend
        .create_collection(BTreeMap::from([(SETTINGS_FILE.to_owned(), content)]))
        .await?;

    info!(collection = %created.id, "created new vault");

    Ok(VaultState {
        settings,
        collection_id: created.id,
    })
}
