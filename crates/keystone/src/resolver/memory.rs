use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{NameRecord, NameResolver, Pointer, ResolverError};
use crate::crypto::SecretKey;
use crate::store::Address;

/// In-memory name resolver keeping the latest signed record per pointer
#[derive(Debug, Clone, Default)]
pub struct MemoryNameResolver {
    inner: Arc<RwLock<HashMap<Pointer, NameRecord>>>,
}

impl MemoryNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the raw record currently held for `pointer`
    pub fn record(&self, pointer: &Pointer) -> Option<NameRecord> {
        self.inner
            .read()
            .ok()
            .and_then(|records| records.get(pointer).cloned())
    }
}

#[async_trait]
impl NameResolver for MemoryNameResolver {
    async fn publish(&self, address: &Address, key: &SecretKey) -> Result<Pointer, ResolverError> {
        let pointer = Pointer::from(key.public());
        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;

        let sequence = inner
            .get(&pointer)
            .map(|record| record.sequence() + 1)
            .unwrap_or(0);
        let record = NameRecord::new(*address, sequence, key);
        inner.insert(pointer, record);

        tracing::debug!(
            "published {} under pointer {} (sequence {})",
            address,
            pointer,
            sequence
        );
        Ok(pointer)
    }

    async fn resolve(&self, pointer: &Pointer) -> Result<Address, ResolverError> {
        let record = {
            let inner = self
                .inner
                .read()
                .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
            inner
                .get(pointer)
                .cloned()
                .ok_or(ResolverError::NotPublished(*pointer))?
        };
        record.verify()?;
        Ok(*record.address())
    }
}
