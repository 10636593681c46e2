//! Content-addressed storage
//!
//! The core only needs two things from storage:
//!
//! - a [`ContentStore`]: immutable bytes keyed by their BLAKE3 [`Address`]
//! - a [`KeystoneIndex`]: the mutable map from a logical keystone id to the
//!   address of its latest version
//!
//! Both are traits so integrations can plug in their own backends. This
//! module ships in-memory implementations and an iroh-blobs backed
//! [`BlobsStore`].

mod blobs;
mod index;
mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::{BlockEncoded, CodecError};

pub use blobs::BlobsStore;
pub use index::{KeystoneIndex, MemoryKeystoneIndex};
pub use memory::MemoryContentStore;

/// Size of a content address in bytes (BLAKE3 digest)
pub const ADDRESS_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("content not found: {0}")]
    NotFound(Address),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// Opaque failure from the storage backend
    #[error("store transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// The BLAKE3 hash identifying an immutable piece of content
///
/// Serializes as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Compute the address of `data`
    pub fn for_content(data: &[u8]) -> Self {
        Address(*blake3::hash(data).as_bytes())
    }

    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut buff = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(s, &mut buff)
            .map_err(|_| anyhow::anyhow!("invalid content address: {}", s))?;
        Ok(Address(buff))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(serde::de::Error::custom)
    }
}

/// Immutable, content-addressed blob storage
#[async_trait]
pub trait ContentStore: Send + Sync + fmt::Debug + Clone + 'static {
    /// Store `data`, returning its address. Storing the same bytes twice
    /// returns the same address.
    async fn put(&self, data: Bytes) -> Result<Address, StoreError>;

    /// Fetch the content at `address`
    ///
    /// Should fail with `StoreError::NotFound` if nothing is stored there.
    async fn get(&self, address: &Address) -> Result<Bytes, StoreError>;

    /// Check whether content exists at `address`
    async fn has(&self, address: &Address) -> Result<bool, StoreError>;
}

/// Encode `value` as DAG-CBOR and store it
pub async fn put_block<S, T>(store: &S, value: &T) -> Result<Address, StoreError>
where
    S: ContentStore,
    T: BlockEncoded,
{
    let bytes = value.encode()?;
    store.put(Bytes::from(bytes)).await
}

/// Fetch and decode the DAG-CBOR block at `address`
pub async fn get_block<S, T>(store: &S, address: &Address) -> Result<T, StoreError>
where
    S: ContentStore,
    T: BlockEncoded,
{
    let bytes = store.get(address).await?;
    Ok(T::decode(&bytes)?)
}
