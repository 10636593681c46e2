//! # Keystones
//!
//! A keystone is the persisted unit of access control:
//!
//! - **Ciphertext**: the payload, encrypted once under a fresh [`DataKey`]
//! - **Keyring**: that data key wrapped once per principal with access
//! - **Metadata**: owner, timestamps and the version chain
//!
//! ```text
//! Keystone ──ciphertext──> AEAD(DataKey, payload)
//!    │
//!    └─keyring─┬─ alice: wrap(DataKey, alice.pub)
//!              ├─ bob:   wrap(DataKey, bob.pub)
//!              └─ ...
//! ```
//!
//! Granting access adds a keyring entry. Revoking rotates: a new data key,
//! a new ciphertext, and a keyring re-wrapped for everyone who remains.
//!
//! ## Versioning
//!
//! Each mutation stores a new immutable snapshot with `version` incremented
//! and `previous` pointing at the prior snapshot's address, forming a
//! version chain per logical id.

mod access;
mod keyring;
mod repository;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::BlockEncoded;
use crate::crypto::{DataKey, EnvelopeEngine, SecretKey};
use crate::store::Address;

pub use access::{AccessController, AccessError, ErrorKind};
pub use keyring::{Keyring, KeyringEntry, KeyringError, Principal};
pub use repository::KeystoneRepository;

/// Descriptive fields stored in the clear next to a keystone's ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoneMetadata {
    /// Logical id this keystone is stored under
    pub id: String,
    /// Name of the owning principal
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Position in the version chain, 0 for the first write
    pub version: u64,
    /// Address of the prior version, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Address>,
}

impl KeystoneMetadata {
    pub fn new(id: impl Into<String>, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner: owner.into(),
            created_at: now,
            updated_at: now,
            version: 0,
            previous: None,
        }
    }

    /// Metadata for the version following the one stored at `previous`
    pub fn advance(&self, previous: Address) -> Self {
        Self {
            id: self.id.clone(),
            owner: self.owner.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
            version: self.version + 1,
            previous: Some(previous),
        }
    }
}

/// Encrypted payload, keyring and metadata for one version of a logical id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keystone {
    ciphertext: Bytes,
    keyring: Keyring,
    metadata: KeystoneMetadata,
}

impl BlockEncoded for Keystone {}

impl Keystone {
    /// Encrypt `payload` under a fresh data key and wrap it for `principals`
    ///
    /// The data key is dropped before returning; only its wraps survive.
    pub fn seal<'a>(
        payload: &[u8],
        principals: impl IntoIterator<Item = &'a Principal>,
        metadata: KeystoneMetadata,
        engine: &EnvelopeEngine,
    ) -> Result<Self, KeyringError> {
        let data_key = engine.generate_data_key()?;
        let keyring = Keyring::seal(&data_key, principals, engine)?;
        Self::seal_with(payload, &data_key, keyring, metadata, engine)
    }

    /// Encrypt `payload` under `data_key` with an already-built keyring
    pub(crate) fn seal_with(
        payload: &[u8],
        data_key: &DataKey,
        keyring: Keyring,
        metadata: KeystoneMetadata,
        engine: &EnvelopeEngine,
    ) -> Result<Self, KeyringError> {
        let ciphertext = engine.encrypt_payload(data_key, payload)?;
        Ok(Self {
            ciphertext: Bytes::from(ciphertext),
            keyring,
            metadata,
        })
    }

    /// Rebuild a keystone from its parts without touching the ciphertext
    pub(crate) fn from_parts(ciphertext: Bytes, keyring: Keyring, metadata: KeystoneMetadata) -> Self {
        Self {
            ciphertext,
            keyring,
            metadata,
        }
    }

    /// Recover the data key through `principal`'s keyring entry
    pub fn data_key(&self, principal: &str, secret_key: &SecretKey) -> Result<DataKey, KeyringError> {
        self.keyring.open(principal, secret_key)
    }

    /// Decrypt the payload as `principal`
    pub fn open(
        &self,
        principal: &str,
        secret_key: &SecretKey,
        engine: &EnvelopeEngine,
    ) -> Result<Vec<u8>, KeyringError> {
        let data_key = self.data_key(principal, secret_key)?;
        Ok(engine.decrypt_payload(&data_key, &self.ciphertext)?)
    }

    pub fn ciphertext(&self) -> &Bytes {
        &self.ciphertext
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    pub fn metadata(&self) -> &KeystoneMetadata {
        &self.metadata
    }

    pub fn owner(&self) -> &str {
        &self.metadata.owner
    }

    pub fn version(&self) -> u64 {
        self.metadata.version
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seal_open_block_roundtrip() {
        let engine = EnvelopeEngine::default();
        let owner = engine.generate_key_pair().unwrap();
        let principal = Principal::new("owner", owner.public_key);

        let keystone = Keystone::seal(
            b"payload",
            [&principal],
            KeystoneMetadata::new("doc", "owner"),
            &engine,
        )
        .unwrap();

        let encoded = keystone.encode().unwrap();
        let decoded = Keystone::decode(&encoded).unwrap();
        assert_eq!(decoded, keystone);
        assert_eq!(decoded.encode().unwrap(), encoded);
        assert_eq!(
            decoded.open("owner", &owner.secret_key, &engine).unwrap(),
            b"payload".to_vec()
        );
    }

    #[test]
    fn test_metadata_advance() {
        let metadata = KeystoneMetadata::new("doc", "owner");
        let previous = Address::for_content(b"v0");
        let next = metadata.advance(previous);
        assert_eq!(next.version, 1);
        assert_eq!(next.previous, Some(previous));
        assert_eq!(next.created_at, metadata.created_at);
        assert!(next.updated_at >= metadata.updated_at);
    }
}
