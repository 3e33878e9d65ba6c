//! Cryptographic primitives for `gistvault`.
//!
//! Provides XChaCha20-Poly1305 authenticated encryption, OS-CSPRNG key
//! generation, and the keyed hash that names shards and records.
//!
//! # Security model
//!
//! - Every encryption draws a fresh 192-bit nonce from `OsRng`; random
//!   nonces of this size do not collide in practice.
//! - A ciphertext is persisted as a [`CiphertextPair`]: base-58 nonce and
//!   base-58 sealed box (ciphertext || 16-byte tag).
//! - Decryption fails closed: wrong key or tampered data is
//!   [`CryptoError::AuthenticationFailed`], never garbage plaintext.
//! - [`VaultKey`] derives `Zeroize` + `ZeroizeOnDrop` and redacts itself
//!   in `Debug` output.

use std::fmt;

use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec;
use crate::error::CryptoError;

/// Vault key length in bytes.
pub const KEY_LEN: usize = 32;

/// XChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// Fill a buffer of `length` bytes from the OS CSPRNG.
#[must_use]
pub fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// The 256-bit symmetric key that identifies and protects a vault.
///
/// Together with the backend account, knowing this key is all that is needed
/// to reopen a vault. Its shareable form is base-58.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Decode a key from its base-58 token.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Malformed`] if the token is not base-58 or does
    /// not decode to exactly 32 bytes.
    pub fn from_base58(token: &str) -> Result<Self, CryptoError> {
        codec::decode_array::<KEY_LEN>(token.trim())
            .map(Self)
            .map_err(|source| CryptoError::Malformed {
                field: "vault key",
                source,
            })
    }

    /// Decode `token` if it is a valid key, otherwise generate a new one.
    ///
    /// The flag is `true` when a new key was generated, so the caller can
    /// show or persist the new token.
    #[must_use]
    pub fn from_token_or_generate(token: Option<&str>) -> (Self, bool) {
        match token.filter(|t| !t.trim().is_empty()).map(Self::from_base58) {
            Some(Ok(key)) => (key, false),
            _ => (Self::generate(), true),
        }
    }

    /// The shareable base-58 token for this key.
    ///
    /// Treat the result as secret.
    #[must_use]
    pub fn to_base58(&self) -> String {
        codec::encode(&self.0)
    }

    /// Borrow the raw key bytes.
    ///
    /// Use with care — the caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An encrypted value: `[nonce, sealed box]`, both base-58.
///
/// Serializes as a two-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextPair(String, String);

impl CiphertextPair {
    /// Assemble a pair from its encoded parts.
    #[must_use]
    pub fn new(nonce: String, sealed: String) -> Self {
        Self(nonce, sealed)
    }

    /// Base-58 nonce.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.0
    }

    /// Base-58 sealed box.
    #[must_use]
    pub fn sealed(&self) -> &str {
        &self.1
    }
}

fn cipher(key: &VaultKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypt a UTF-8 string with a fresh random nonce.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt(plaintext: &str, key: &VaultKey) -> Result<CiphertextPair, CryptoError> {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let sealed = cipher(key)
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    Ok(CiphertextPair(codec::encode(&nonce), codec::encode(&sealed)))
}

/// Decrypt a pair produced by [`encrypt`].
///
/// # Errors
///
/// - [`CryptoError::Malformed`] if either field is not valid base-58 or the
///   nonce has the wrong length.
/// - [`CryptoError::AuthenticationFailed`] for a wrong key or tampered data.
/// - [`CryptoError::InvalidPlaintext`] if the plaintext is not UTF-8.
pub fn decrypt(pair: &CiphertextPair, key: &VaultKey) -> Result<String, CryptoError> {
    let nonce = codec::decode_array::<NONCE_LEN>(pair.nonce())
        .map_err(|source| CryptoError::Malformed {
            field: "nonce",
            source,
        })?;
    let sealed = codec::decode(pair.sealed()).map_err(|source| CryptoError::Malformed {
        field: "sealed box",
        source,
    })?;

    let plaintext = cipher(key)
        .decrypt(XNonce::from_slice(&nonce), sealed.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidPlaintext)
}

/// One-way, key-scoped hash of `data`.
///
/// SHA-512 over the JSON serialization of `[username, key bytes, data]`,
/// base-58 encoded. Deterministic for equal inputs; because the key is part
/// of the input, the same `data` hashes to unrelated values in different
/// vaults.
///
/// # Errors
///
/// Returns [`CryptoError::Serialization`] if `data` cannot be serialized.
pub fn keyed_hash<T>(username: &str, key: &VaultKey, data: &T) -> Result<String, CryptoError>
where
    T: Serialize + ?Sized,
{
    let mut message = serde_json::to_vec(&(username, key.as_bytes(), data)).map_err(|e| {
        CryptoError::Serialization {
            reason: e.to_string(),
        }
    })?;
    let digest = Sha512::digest(&message);
    message.zeroize();

    Ok(codec::encode(&digest))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = VaultKey::generate();
        let long = "x".repeat(10_000);
        for plaintext in ["hunter2", "", "ünïcødé ✓", long.as_str()] {
            let pair = encrypt(plaintext, &key).unwrap();
            assert_eq!(decrypt(&pair, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn decrypt_wrong_key_fails_authentication() {
        let pair = encrypt("secret", &VaultKey::generate()).unwrap();
        let result = decrypt(&pair, &VaultKey::generate());
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn decrypt_tampered_box_fails_authentication() {
        let key = VaultKey::generate();
        let pair = encrypt("secret", &key).unwrap();

        let mut sealed = codec::decode(pair.sealed()).unwrap();
        sealed[0] ^= 0xFF;
        let tampered = CiphertextPair::new(pair.nonce().to_owned(), codec::encode(&sealed));

        let result = decrypt(&tampered, &key);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn decrypt_swapped_nonce_fails_authentication() {
        let key = VaultKey::generate();
        let a = encrypt("one", &key).unwrap();
        let b = encrypt("two", &key).unwrap();
        let mixed = CiphertextPair::new(b.nonce().to_owned(), a.sealed().to_owned());
        assert!(matches!(
            decrypt(&mixed, &key),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn decrypt_malformed_fields() {
        let key = VaultKey::generate();
        let bad_nonce = CiphertextPair::new("0OIl".to_owned(), "abc".to_owned());
        assert!(matches!(
            decrypt(&bad_nonce, &key),
            Err(CryptoError::Malformed { field: "nonce", .. })
        ));

        let short_nonce = CiphertextPair::new(codec::encode(&[1u8; 8]), "abc".to_owned());
        assert!(matches!(
            decrypt(&short_nonce, &key),
            Err(CryptoError::Malformed { field: "nonce", .. })
        ));
    }

    #[test]
    fn nonces_are_fresh() {
        let key = VaultKey::generate();
        let a = encrypt("same", &key).unwrap();
        let b = encrypt("same", &key).unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.sealed(), b.sealed());
        assert_eq!(codec::decode(a.nonce()).unwrap().len(), NONCE_LEN);
    }

    #[test]
    fn pair_serializes_as_array() {
        let pair = CiphertextPair::new("n".to_owned(), "b".to_owned());
        assert_eq!(serde_json::to_string(&pair).unwrap(), r#"["n","b"]"#);
        let back: CiphertextPair = serde_json::from_str(r#"["n","b"]"#).unwrap();
        assert_eq!(back, pair);
    }

    #[test]
    fn keyed_hash_is_deterministic() {
        let key = VaultKey::generate();
        let tags = ["example.com", "alice"];
        assert_eq!(
            keyed_hash("alice", &key, &tags).unwrap(),
            keyed_hash("alice", &key, &tags).unwrap()
        );
    }

    #[test]
    fn keyed_hash_is_scoped_by_key_and_username() {
        let k1 = VaultKey::generate();
        let k2 = VaultKey::generate();
        let base = keyed_hash("alice", &k1, "example.com").unwrap();
        assert_ne!(base, keyed_hash("alice", &k2, "example.com").unwrap());
        assert_ne!(base, keyed_hash("bob", &k1, "example.com").unwrap());
        assert_ne!(base, keyed_hash("alice", &k1, "example.org").unwrap());
    }

    #[test]
    fn keyed_hash_is_sha512_sized() {
        let key = VaultKey::from_bytes([9u8; KEY_LEN]);
        let hash = keyed_hash("u", &key, &["t"]).unwrap();
        assert_eq!(codec::decode(&hash).unwrap().len(), 64);
    }

    #[test]
    fn random_bytes_has_requested_length() {
        assert_eq!(random_bytes(0).len(), 0);
        assert_eq!(random_bytes(48).len(), 48);
        assert_ne!(random_bytes(32), random_bytes(32));
    }

    #[test]
    fn key_base58_roundtrip() {
        let key = VaultKey::generate();
        let token = key.to_base58();
        let back = VaultKey::from_base58(&token).unwrap();
        assert_eq!(back.as_bytes(), key.as_bytes());
    }

    #[test]
    fn key_from_wrong_length_token_is_rejected() {
        let token = codec::encode(&[1u8; 16]);
        assert!(matches!(
            VaultKey::from_base58(&token),
            Err(CryptoError::Malformed {
                field: "vault key",
                ..
            })
        ));
    }

    #[test]
    fn key_from_token_or_generate() {
        let key = VaultKey::generate();
        let token = key.to_base58();

        let (reused, generated) = VaultKey::from_token_or_generate(Some(&token));
        assert!(!generated);
        assert_eq!(reused.as_bytes(), key.as_bytes());

        for bad in [None, Some(""), Some("not-base58!"), Some("abc")] {
            let (_, generated) = VaultKey::from_token_or_generate(bad);
            assert!(generated, "{bad:?} should yield a new key");
        }
    }

    #[test]
    fn vault_key_debug_redacts_bytes() {
        let key = VaultKey::from_bytes([0xAB; KEY_LEN]);
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("171"));
    }
}
