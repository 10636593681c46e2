//! Payload encryption using ChaCha20-Poly1305
//!
//! A [`DataKey`] encrypts one payload exactly once, no matter how many
//! principals are later given access to it. Access is handed out by wrapping
//! the key (see [`WrappedKey`](super::WrappedKey)), never by re-encrypting
//! the payload.

use std::fmt;

use chacha20poly1305::Key;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};

use super::entropy::{EntropyError, EntropySource};

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of a data key in bytes (256 bits)
pub const DATA_KEY_SIZE: usize = 32;
/// Size of BLAKE3 hash in bytes (256 bits)
pub const BLAKE3_HASH_SIZE: usize = 32;
/// Size of the Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Errors that can occur during payload encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum DataKeyError {
    #[error(transparent)]
    Entropy(#[from] EntropyError),
    #[error("invalid data key size, expected {DATA_KEY_SIZE}, got {0}")]
    InvalidSize(usize),
    #[error("payload encryption failed")]
    Encrypt,
    /// Authentication failed or the envelope is truncated. No plaintext
    /// is ever returned alongside this error.
    #[error("payload decryption failed: {0}")]
    Decrypt(&'static str),
}

/// An ephemeral 256-bit symmetric key for payload encryption
///
/// The sealed format is: `nonce (12 bytes) || encrypted(hash(32 bytes) || plaintext) || tag (16 bytes)`.
/// A BLAKE3 hash of the plaintext rides inside the AEAD so a successful
/// decryption is also checked against the original content.
///
/// `DataKey` does not implement `Serialize`; it only ever
/// leaves memory wrapped for a principal.
#[derive(PartialEq, Eq, Clone)]
pub struct DataKey([u8; DATA_KEY_SIZE]);

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(..)")
    }
}

impl From<[u8; DATA_KEY_SIZE]> for DataKey {
    fn from(bytes: [u8; DATA_KEY_SIZE]) -> Self {
        DataKey(bytes)
    }
}

impl Drop for DataKey {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

impl DataKey {
    /// Generate a fresh random data key
    pub fn generate(entropy: &dyn EntropySource) -> Result<Self, DataKeyError> {
        let mut buff = [0; DATA_KEY_SIZE];
        entropy.fill(&mut buff)?;
        Ok(Self(buff))
    }

    /// Create a data key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `DATA_KEY_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, DataKeyError> {
        if data.len() != DATA_KEY_SIZE {
            return Err(DataKeyError::InvalidSize(data.len()));
        }
        let mut buff = [0; DATA_KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Get a reference to the key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Encrypt a payload under this key with a freshly drawn nonce
    pub fn encrypt(
        &self,
        data: &[u8],
        entropy: &dyn EntropySource,
    ) -> Result<Vec<u8>, DataKeyError> {
        let plaintext_hash = blake3::hash(data);

        let mut data_with_hash = Vec::with_capacity(BLAKE3_HASH_SIZE + data.len());
        data_with_hash.extend_from_slice(plaintext_hash.as_bytes());
        data_with_hash.extend_from_slice(data);

        let key = Key::from_slice(self.bytes());
        let cipher = ChaCha20Poly1305::new(key);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        entropy.fill(&mut nonce_bytes)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data_with_hash.as_ref())
            .map_err(|_| DataKeyError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_ref());
        out.extend_from_slice(ciphertext.as_ref());

        Ok(out)
    }

    /// Decrypt a payload sealed by [`DataKey::encrypt`]
    ///
    /// # Errors
    ///
    /// Returns [`DataKeyError::Decrypt`] if:
    /// - Data is too short to contain a nonce and tag
    /// - Authentication tag verification fails (tampered data or wrong key)
    /// - The embedded plaintext hash does not match
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, DataKeyError> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(DataKeyError::Decrypt("data too short for nonce"));
        }

        let key = Key::from_slice(self.bytes());
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let cipher = ChaCha20Poly1305::new(key);
        let decrypted = cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| DataKeyError::Decrypt("authentication failed"))?;

        if decrypted.len() < BLAKE3_HASH_SIZE {
            return Err(DataKeyError::Decrypt("decrypted data too short for hash header"));
        }

        let stored_hash = &decrypted[..BLAKE3_HASH_SIZE];
        let plaintext = &decrypted[BLAKE3_HASH_SIZE..];

        let computed_hash = blake3::hash(plaintext);
        if stored_hash != computed_hash.as_bytes() {
            return Err(DataKeyError::Decrypt("hash verification failed"));
        }

        Ok(plaintext.to_vec())
    }

    /// Split a sealed payload into its nonce and the authenticated ciphertext
    pub fn split_sealed(data: &[u8]) -> Option<(&[u8], &[u8])> {
        if data.len() < NONCE_SIZE {
            return None;
        }
        Some(data.split_at(NONCE_SIZE))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::entropy::{OsEntropy, SeededEntropy};

    #[test]
    fn test_data_key_encrypt_decrypt() {
        let key = DataKey::generate(&OsEntropy).unwrap();
        let data = b"hello world, this is a test message for encryption";

        let encrypted = key.encrypt(data, &OsEntropy).unwrap();
        let decrypted = key.decrypt(&encrypted).unwrap();

        assert_eq!(data.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_data_key_size_validation() {
        assert!(DataKey::from_slice(&[1u8; 16]).is_err());
        assert!(DataKey::from_slice(&[1u8; 64]).is_err());
        assert!(DataKey::from_slice(&[1u8; DATA_KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = DataKey::generate(&OsEntropy).unwrap();
        let first = key.encrypt(b"same", &OsEntropy).unwrap();
        let second = key.encrypt(b"same", &OsEntropy).unwrap();

        let (first_nonce, _) = DataKey::split_sealed(&first).unwrap();
        let (second_nonce, _) = DataKey::split_sealed(&second).unwrap();
        assert_ne!(first_nonce, second_nonce);
        assert_ne!(first, second);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = DataKey::generate(&OsEntropy).unwrap();
        let mut encrypted = key.encrypt(b"test data for integrity check", &OsEntropy).unwrap();
        encrypted[NONCE_SIZE + 10] ^= 0xFF;

        let result = key.decrypt(&encrypted);
        assert!(matches!(result, Err(DataKeyError::Decrypt(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = DataKey::generate(&OsEntropy).unwrap();
        let other = DataKey::generate(&OsEntropy).unwrap();
        let encrypted = key.encrypt(b"secret", &OsEntropy).unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_truncated_input_fails() {
        let key = DataKey::generate(&OsEntropy).unwrap();
        assert!(key.decrypt(&[0u8; 4]).is_err());
        assert!(key.decrypt(&[0u8; NONCE_SIZE + 3]).is_err());
    }

    #[test]
    fn test_empty_payload() {
        let key = DataKey::generate(&OsEntropy).unwrap();
        let encrypted = key.encrypt(b"", &OsEntropy).unwrap();
        assert_eq!(encrypted.len(), NONCE_SIZE + BLAKE3_HASH_SIZE + TAG_SIZE);
        assert!(key.decrypt(&encrypted).unwrap().is_empty());
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let a = DataKey::generate(&SeededEntropy::new(1)).unwrap();
        let b = DataKey::generate(&SeededEntropy::new(1)).unwrap();
        assert_eq!(a, b);
    }
}
