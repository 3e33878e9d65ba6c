//! Shard and record identifiers derived from tags.
//!
//! The first tag of a sequence selects the shard file; the whole sequence
//! selects the record inside it. Both are keyed hashes, so the names stored
//! on the backend reveal nothing about the tags without the vault key.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::crypto::{self, VaultKey};
use crate::error::CryptoError;

/// Number of trailing hash characters used as a partition id.
pub const FILENAME_LENGTH: usize = 16;

/// Extension appended to partition ids to form shard filenames.
pub const SHARD_EXTENSION: &str = ".json";

/// Tag used when a caller supplies no tags at all.
pub const DEFAULT_TAG: &str = "_";

/// How a tag sequence maps to a record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagIdentity {
    /// The sequence is hashed as given: `[a, b]` and `[b, a]` are different
    /// records.
    #[default]
    Sequence,
    /// Tags are sorted and de-duplicated before hashing: the same set of
    /// tags always addresses the same record.
    Set,
}

/// Replace an empty tag sequence with `[DEFAULT_TAG]`.
#[must_use]
pub fn normalize_tags(tags: &[String]) -> Cow<'_, [String]> {
    if tags.is_empty() {
        Cow::Owned(vec![DEFAULT_TAG.to_owned()])
    } else {
        Cow::Borrowed(tags)
    }
}

/// Derives partition ids and record keys for one vault.
pub struct Partitioner {
    username: String,
    key: VaultKey,
    identity: TagIdentity,
}

impl Partitioner {
    /// Create a partitioner scoped to `username` and `key`.
    #[must_use]
    pub fn new(username: impl Into<String>, key: VaultKey, identity: TagIdentity) -> Self {
        Self {
            username: username.into(),
            key,
            identity,
        }
    }

    /// The shard selector: the last [`FILENAME_LENGTH`] characters of the
    /// keyed hash of the first tag.
    ///
    /// Truncation raises the collision rate; colliding partitions simply
    /// share a shard, where records stay apart by their full record keys.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Serialization`] if hashing fails.
    pub fn partition_id(&self, tags: &[String]) -> Result<String, CryptoError> {
        let tags = normalize_tags(tags);
        let first = tags.first().map_or(DEFAULT_TAG, String::as_str);
        let hash = crypto::keyed_hash(&self.username, &self.key, first)?;

        // Base-58 is ASCII, so byte offsets are character offsets.
        let start = hash.len().saturating_sub(FILENAME_LENGTH);
        Ok(hash[start..].to_owned())
    }

    /// The shard filename for a tag sequence: `<partition id>.json`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Serialization`] if hashing fails.
    pub fn shard_filename(&self, tags: &[String]) -> Result<String, CryptoError> {
        Ok(format!("{}{SHARD_EXTENSION}", self.partition_id(tags)?))
    }

    /// The record key for a tag sequence within its shard.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Serialization`] if hashing fails.
    pub fn record_key(&self, tags: &[String]) -> Result<String, CryptoError> {
        let tags = normalize_tags(tags);
        match self.identity {
            TagIdentity::Sequence => crypto::keyed_hash(&self.username, &self.key, &*tags),
            TagIdentity::Set => {
                let mut set = tags.into_owned();
                set.sort_unstable();
                set.dedup();
                crypto::keyed_hash(&self.username, &self.key, &set)
            }
        }
    }
}

impl std::fmt::Debug for Partitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partitioner")
            .field("username", &self.username)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|&t| t.to_owned()).collect()
    }

    fn partitioner(identity: TagIdentity) -> Partitioner {
        Partitioner::new("alice", VaultKey::from_bytes([3u8; 32]), identity)
    }

    #[test]
    fn partition_id_has_fixed_length() {
        let p = partitioner(TagIdentity::Sequence);
        let id = p.partition_id(&tags(&["example.com"])).unwrap();
        assert_eq!(id.len(), FILENAME_LENGTH);
        assert!(crate::codec::decode(&id).is_ok());
    }

    #[test]
    fn partition_follows_first_tag_only() {
        let p = partitioner(TagIdentity::Sequence);
        let a = p.partition_id(&tags(&["example.com", "alice"])).unwrap();
        let b = p.partition_id(&tags(&["example.com", "bob", "x"])).unwrap();
        let c = p.partition_id(&tags(&["example.org", "alice"])).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn partition_is_suffix_of_first_tag_hash() {
        let p = partitioner(TagIdentity::Sequence);
        let full = crypto::keyed_hash("alice", &VaultKey::from_bytes([3u8; 32]), "site").unwrap();
        let id = p.partition_id(&tags(&["site", "other"])).unwrap();
        assert!(full.ends_with(&id));
    }

    #[test]
    fn shard_filename_has_extension() {
        let p = partitioner(TagIdentity::Sequence);
        let name = p.shard_filename(&tags(&["example.com"])).unwrap();
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), FILENAME_LENGTH + SHARD_EXTENSION.len());
    }

    #[test]
    fn record_key_is_deterministic() {
        let p = partitioner(TagIdentity::Sequence);
        let t = tags(&["example.com", "alice"]);
        assert_eq!(p.record_key(&t).unwrap(), p.record_key(&t).unwrap());
    }

    #[test]
    fn sequence_identity_is_order_sensitive() {
        let p = partitioner(TagIdentity::Sequence);
        let ab = p.record_key(&tags(&["a", "b"])).unwrap();
        let ba = p.record_key(&tags(&["b", "a"])).unwrap();
        assert_ne!(ab, ba);
    }

    #[test]
    fn set_identity_ignores_order_and_duplicates() {
        let p = partitioner(TagIdentity::Set);
        let ab = p.record_key(&tags(&["a", "b"])).unwrap();
        let ba = p.record_key(&tags(&["b", "a", "b"])).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn keys_differ_across_vaults() {
        let mine = partitioner(TagIdentity::Sequence);
        let theirs = Partitioner::new("alice", VaultKey::from_bytes([4u8; 32]), TagIdentity::Sequence);
        let t = tags(&["example.com"]);
        assert_ne!(mine.partition_id(&t).unwrap(), theirs.partition_id(&t).unwrap());
        assert_ne!(mine.record_key(&t).unwrap(), theirs.record_key(&t).unwrap());
    }

    #[test]
    fn empty_tags_use_default_tag() {
        let p = partitioner(TagIdentity::Sequence);
        assert_eq!(
            p.record_key(&[]).unwrap(),
            p.record_key(&tags(&[DEFAULT_TAG])).unwrap()
        );
        assert_eq!(
            p.partition_id(&[]).unwrap(),
            p.partition_id(&tags(&[DEFAULT_TAG])).unwrap()
        );
    }

    #[test]
    fn tag_identity_parses_lowercase() {
        let identity: TagIdentity = serde_json::from_str("\"set\"").unwrap();
        assert_eq!(identity, TagIdentity::Set);
        assert_eq!(TagIdentity::default(), TagIdentity::Sequence);
    }
}
