use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{Address, ContentStore, StoreError};

/// In-memory content store using a HashMap
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<RwLock<HashMap<Address, Bytes>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held
    pub fn len(&self) -> usize {
        self.inner.read().map(|blobs| blobs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, data: Bytes) -> Result<Address, StoreError> {
        let address = Address::for_content(&data);
        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;
        inner.entry(address).or_insert(data);
        Ok(address)
    }

    async fn get(&self, address: &Address) -> Result<Bytes, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
        inner
            .get(address)
            .cloned()
            .ok_or(StoreError::NotFound(*address))
    }

    async fn has(&self, address: &Address) -> Result<bool, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
        Ok(inner.contains_key(address))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryContentStore::new();
        let address = store.put(Bytes::from_static(b"data")).await.unwrap();
        assert_eq!(address, Address::for_content(b"data"));
        assert_eq!(store.get(&address).await.unwrap(), Bytes::from_static(b"data"));
        assert!(store.has(&address).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryContentStore::new();
        let first = store.put(Bytes::from_static(b"data")).await.unwrap();
        let second = store.put(Bytes::from_static(b"data")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_content() {
        let store = MemoryContentStore::new();
        let address = Address::for_content(b"never stored");
        assert!(matches!(
            store.get(&address).await,
            Err(StoreError::NotFound(a)) if a == address
        ));
        assert!(!store.has(&address).await.unwrap());
    }
}
