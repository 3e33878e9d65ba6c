//! Error types for `gistvault-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Crypto errors never include key material or plaintext — only
//! field names, filenames, and record keys (which are already public on the
//! backend).

use gistvault_storage::StorageError;

/// Errors from base-58 decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid base-58.
    #[error("invalid base-58: {reason}")]
    InvalidBase58 { reason: String },

    /// The decoded value has the wrong byte length.
    #[error("decoded length mismatch: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Authenticated decryption failed (wrong key, corrupted or tampered
    /// ciphertext).
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A ciphertext field or key could not be decoded.
    #[error("malformed {field}: {source}")]
    Malformed {
        field: &'static str,
        #[source]
        source: CodecError,
    },

    /// Decryption succeeded but the plaintext is not UTF-8.
    #[error("decrypted plaintext is not valid UTF-8")]
    InvalidPlaintext,

    /// XChaCha20-Poly1305 encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// A value could not be serialized for hashing.
    #[error("serialization for hashing failed: {reason}")]
    Serialization { reason: String },
}

/// Errors from vault discovery and creation.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The backend failed while listing, reading, or creating collections.
    #[error("bootstrap storage error: {0}")]
    Storage(#[from] StorageError),

    /// The settings marker could not be encrypted.
    #[error("bootstrap crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The new settings record could not be serialized.
    #[error("failed to serialize settings: {reason}")]
    Serialization { reason: String },
}

/// Errors from vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Locating or creating the vault's collection failed. Nothing is
    /// memoized; the next call starts discovery from scratch.
    #[error("vault bootstrap failed: {0}")]
    Bootstrap(#[source] BootstrapError),

    /// The backend returned an error.
    #[error("vault storage error: {0}")]
    Storage(#[from] StorageError),

    /// A cryptographic operation failed.
    #[error("vault crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A shard entry did not authenticate under this vault's key.
    #[error("entry '{record_key}' in '{file}' failed authentication")]
    AuthenticationFailed { file: String, record_key: String },

    /// A stored file or entry is not in the expected shape.
    #[error("malformed record in '{file}': {reason}")]
    MalformedRecord { file: String, reason: String },

    /// A record or shard could not be serialized for writing.
    #[error("failed to serialize {what}: {reason}")]
    Serialization { what: &'static str, reason: String },

    /// A site URL could not be parsed.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl VaultError {
    /// Whether the backend rejected the account credentials while the vault
    /// was being located. Callers should ask for new credentials and retry.
    #[must_use]
    pub fn is_credentials_rejected(&self) -> bool {
        matches!(self, Self::Bootstrap(BootstrapError::Storage(e)) if e.is_auth())
    }
}
