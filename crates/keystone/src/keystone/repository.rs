use crate::store::{get_block, put_block, Address, ContentStore, KeystoneIndex, StoreError};

use super::Keystone;

/// Persists keystones as immutable blocks and tracks the latest version of
/// each logical id.
///
/// Storing never overwrites content: every `put` writes a new block and
/// moves the id's pointer. There is no expected-version check, so two
/// writers racing on one id resolve last-write-wins.
#[derive(Debug, Clone)]
pub struct KeystoneRepository<S, I> {
    store: S,
    index: I,
}

impl<S, I> KeystoneRepository<S, I>
where
    S: ContentStore,
    I: KeystoneIndex,
{
    pub fn new(store: S, index: I) -> Self {
        Self { store, index }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Latest address of `id`, or `None` if it has no pointer
    pub async fn content_address(&self, id: &str) -> Result<Option<Address>, StoreError> {
        self.index.get(id).await
    }

    /// Load the latest version of `id`
    pub async fn get(&self, id: &str) -> Result<Option<(Address, Keystone)>, StoreError> {
        let address = match self.index.get(id).await? {
            Some(address) => address,
            None => return Ok(None),
        };
        let keystone = self.load(&address).await?;
        Ok(Some((address, keystone)))
    }

    /// Load a specific version by address
    pub async fn load(&self, address: &Address) -> Result<Keystone, StoreError> {
        get_block(&self.store, address).await
    }

    /// Store `keystone` as the new latest version of `id`
    pub async fn put(&self, id: &str, keystone: &Keystone) -> Result<Address, StoreError> {
        let address = put_block(&self.store, keystone).await?;
        self.index.set(id, address).await?;
        tracing::debug!(
            "stored keystone {} version {} at {}",
            id,
            keystone.version(),
            address
        );
        Ok(address)
    }

    /// Remove the pointer for `id`. Stored blocks stay addressable.
    pub async fn delete(&self, id: &str) -> Result<Option<Address>, StoreError> {
        self.index.remove(id).await
    }

    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        self.index.list().await
    }

    /// Every stored version of `id`, newest first
    pub async fn history(&self, id: &str) -> Result<Vec<(Address, Keystone)>, StoreError> {
        let mut versions = Vec::new();
        let mut next = self.index.get(id).await?;
        while let Some(address) = next {
            let keystone = self.load(&address).await?;
            next = keystone.metadata().previous;
            versions.push((address, keystone));
        }
        Ok(versions)
    }
}
