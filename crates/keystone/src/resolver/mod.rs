//! Name resolution
//!
//! A [`Pointer`] is a stable, mutable reference to the latest content
//! address of something that keeps changing (a write node's keystone, an
//! aggregation). Only the holder of the pointer's [`SecretKey`] can move it.
//!
//! Every publish produces a [`NameRecord`]: the address, a sequence number
//! that grows with each publish, and an Ed25519 signature over both.
//! Resolvers verify the signature before handing an address back.

mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, SecretKey, Signature};
use crate::store::Address;

pub use memory::MemoryNameResolver;

const RECORD_DOMAIN: &[u8] = b"keystone/name-record/v1";

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("nothing published under pointer {0}")]
    NotPublished(Pointer),
    #[error("record for pointer {0} failed signature verification")]
    InvalidRecord(Pointer),
    /// Opaque failure from the resolution backend
    #[error("resolver transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// A name-resolution pointer, identified by the public key that controls it
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pointer(PublicKey);

impl Pointer {
    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }
}

impl From<PublicKey> for Pointer {
    fn from(key: PublicKey) -> Self {
        Pointer(key)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({})", self.0)
    }
}

/// A signed claim that `pointer` currently resolves to `address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pointer: Pointer,
    address: Address,
    sequence: u64,
    signature: Signature,
}

impl NameRecord {
    /// Create and sign a record with the pointer's secret key
    pub fn new(address: Address, sequence: u64, key: &SecretKey) -> Self {
        let signature = key.sign(&Self::signing_bytes(&address, sequence));
        Self {
            pointer: Pointer(key.public()),
            address,
            sequence,
            signature,
        }
    }

    fn signing_bytes(address: &Address, sequence: u64) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(RECORD_DOMAIN.len() + 40);
        bytes.extend_from_slice(RECORD_DOMAIN);
        bytes.extend_from_slice(address.as_bytes());
        bytes.extend_from_slice(&sequence.to_be_bytes());
        bytes
    }

    /// Check the signature against the pointer's public key
    pub fn verify(&self) -> Result<(), ResolverError> {
        self.pointer
            .public_key()
            .verify(
                &Self::signing_bytes(&self.address, self.sequence),
                &self.signature,
            )
            .map_err(|_| ResolverError::InvalidRecord(self.pointer))
    }

    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Publish and resolve mutable pointers to immutable content
#[async_trait]
pub trait NameResolver: Send + Sync + fmt::Debug + Clone + 'static {
    /// Point the pointer controlled by `key` at `address`
    async fn publish(&self, address: &Address, key: &SecretKey) -> Result<Pointer, ResolverError>;

    /// Resolve `pointer` to the address most recently published under it
    ///
    /// Should fail with `ResolverError::NotPublished` if nothing was ever
    /// published under the pointer.
    async fn resolve(&self, pointer: &Pointer) -> Result<Address, ResolverError>;
}
