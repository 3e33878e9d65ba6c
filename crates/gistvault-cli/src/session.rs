//! Cached login credentials.
//!
//! After a successful run the username and password are stored in the
//! session file, each sealed under the vault key, so later runs with the
//! same key need no credentials. A session that does not open under the
//! current key is treated as absent.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gistvault_core::codec;
use gistvault_core::crypto::{self, CiphertextPair, VaultKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// GitHub account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct SessionRecord {
    username: CiphertextPair,
    password: CiphertextPair,
}

/// The on-disk session cache.
#[derive(Debug, Clone)]
pub struct Session {
    path: PathBuf,
}

impl Session {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Credentials cached for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file exists but cannot be read.
    pub fn load(&self, key: &VaultKey) -> Result<Option<Credentials>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read session {}", self.path.display()));
            }
        };

        let Ok(record) = serde_json::from_str::<SessionRecord>(&content) else {
            debug!(path = %self.path.display(), "ignoring unparseable session");
            return Ok(None);
        };

        match (
            crypto::decrypt(&record.username, key),
            crypto::decrypt(&record.password, key),
        ) {
            (Ok(username), Ok(password)) => Ok(Some(Credentials { username, password })),
            _ => {
                debug!(path = %self.path.display(), "session belongs to another key");
                Ok(None)
            }
        }
    }

    /// Seal `credentials` under `key` and write them, replacing any
    /// previous session. The file is readable by the owner only.
    ///
    /// # Errors
    ///
    /// Returns `Err` if encryption or the write fails.
    pub fn save(&self, key: &VaultKey, credentials: &Credentials) -> Result<()> {
        let record = SessionRecord {
            username: crypto::encrypt(&credentials.username, key)?,
            password: crypto::encrypt(&credentials.password, key)?,
        };
        let content = codec::to_file_json(&record).context("failed to serialize session")?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            options.mode(0o600);
        }

        let mut file = options
            .open(&self.path)
            .with_context(|| format!("failed to open session {}", self.path.display()))?;
        // `mode` only applies when the file is created.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to restrict session {}", self.path.display()))?;
        }
        file.write_all(content.as_bytes())
            .with_context(|| format!("failed to write session {}", self.path.display()))?;

        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Delete the session file. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("failed to remove session {}", self.path.display()))
            }
        }
    }
}
