//! Core library for `gistvault`.
//!
//! An encrypted secret vault layered on a remote file-collection backend.
//! The client holds a 32-byte key; the backend only ever sees ciphertext,
//! keyed-hash filenames, and keyed-hash record keys.
//!
//! - [`crypto`] — secret box, key generation, keyed hashing
//! - [`codec`] — base-58 text encoding for every binary field
//! - [`bootstrap`] — locate or create this key's settings record
//! - [`partition`] — shard and record identifiers derived from tags
//! - [`store`] — the [`Vault`](store::Vault): tag-ranked get/set
//! - [`site`] — URL normalization and password tag layout

pub mod bootstrap;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod partition;
pub mod site;
pub mod store;

pub use crypto::VaultKey;
pub use error::VaultError;
pub use store::{EntryPolicy, SecretMatch, Vault, VaultOptions};
