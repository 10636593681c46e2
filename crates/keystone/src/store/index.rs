use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Address, StoreError};

/// The mutable map from a logical keystone id to its latest version
///
/// Content in the [`ContentStore`](super::ContentStore) never changes; this
/// index is the only mutable state a keystone has. Writes are
/// last-write-wins: `set` does not check which address it replaces.
#[async_trait]
pub trait KeystoneIndex: Send + Sync + Debug + Clone + 'static {
    /// Get the latest address for `id`, if any
    async fn get(&self, id: &str) -> Result<Option<Address>, StoreError>;

    /// Point `id` at `address`
    async fn set(&self, id: &str, address: Address) -> Result<(), StoreError>;

    /// Drop the pointer for `id`, returning the address it held
    async fn remove(&self, id: &str) -> Result<Option<Address>, StoreError>;

    /// List every id that currently has a pointer
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory keystone index
#[derive(Debug, Clone, Default)]
pub struct MemoryKeystoneIndex {
    inner: Arc<RwLock<BTreeMap<String, Address>>>,
}

impl MemoryKeystoneIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeystoneIndex for MemoryKeystoneIndex {
    async fn get(&self, id: &str) -> Result<Option<Address>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
        Ok(inner.get(id).copied())
    }

    async fn set(&self, id: &str, address: Address) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;
        inner.insert(id.to_string(), address);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<Option<Address>, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;
        Ok(inner.remove(id))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
        Ok(inner.keys().cloned().collect())
    }
}
