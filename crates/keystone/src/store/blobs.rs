use std::future::IntoFuture;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use iroh_blobs::{
    api::blobs::{BlobStatus, Blobs},
    store::{fs::FsStore, mem::MemStore},
    BlobsProtocol, Hash,
};

use super::{Address, ContentStore, StoreError};

/// Content store over a local iroh-blobs store.
///
/// iroh-blobs addresses content by its BLAKE3 hash, which is exactly an
/// [`Address`], so the two convert without lookups.
#[derive(Clone, Debug)]
pub struct BlobsStore {
    pub inner: Arc<BlobsProtocol>,
}

impl Deref for BlobsStore {
    type Target = Arc<BlobsProtocol>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<Address> for Hash {
    fn from(address: Address) -> Self {
        Hash::from_bytes(*address.as_bytes())
    }
}

impl From<Hash> for Address {
    fn from(hash: Hash) -> Self {
        Address::from_bytes(*hash.as_bytes())
    }
}

impl BlobsStore {
    /// Load a filesystem-backed blob store from the given path
    pub async fn fs(path: &Path) -> Result<Self, StoreError> {
        tracing::debug!("BlobsStore::fs called with path: {:?}", path);
        let store = FsStore::load(path).await.map_err(|e| anyhow!(e))?;
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    /// Load a memory blobs store
    pub async fn memory() -> Result<Self, StoreError> {
        let store = MemStore::new();
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    /// Get a handle to the underlying blobs client against
    ///  the store
    pub fn blobs(&self) -> &Blobs {
        self.inner.store().blobs()
    }
}

#[async_trait]
impl ContentStore for BlobsStore {
    async fn put(&self, data: Bytes) -> Result<Address, StoreError> {
        let hash = self
            .blobs()
            .add_bytes(data)
            .into_future()
            .await
            .map_err(|e| anyhow!(e))?
            .hash;
        Ok(hash.into())
    }

    async fn get(&self, address: &Address) -> Result<Bytes, StoreError> {
        // a missing blob surfaces as NotFound rather than a transport error
        if !self.has(address).await? {
            return Err(StoreError::NotFound(*address));
        }
        let bytes = self
            .blobs()
            .get_bytes(Hash::from(*address))
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(bytes)
    }

    async fn has(&self, address: &Address) -> Result<bool, StoreError> {
        let stat = self
            .blobs()
            .status(Hash::from(*address))
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(matches!(stat, BlobStatus::Complete { .. }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_memory_blobs_roundtrip() {
        let store = BlobsStore::memory().await.unwrap();
        let address = store.put(Bytes::from_static(b"blob")).await.unwrap();
        assert_eq!(address, Address::for_content(b"blob"));
        assert_eq!(store.get(&address).await.unwrap(), Bytes::from_static(b"blob"));
    }

    #[tokio::test]
    async fn test_fs_blobs_missing_is_not_found() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = BlobsStore::fs(&temp_dir.path().join("blobs")).await.unwrap();
        let address = Address::for_content(b"absent");
        assert!(matches!(
            store.get(&address).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
