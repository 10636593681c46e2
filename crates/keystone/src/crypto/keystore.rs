use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::entropy::EntropySource;
use super::keys::{KeyError, PublicKey, SecretKey};

/// A caller-owned, in-memory store of principal keypairs
///
/// Nothing in this crate keeps a process-wide key registry. Components that
/// need to act on behalf of a principal (e.g. rotation during a revoke)
/// are handed a `KeyStore` explicitly, and each test can build its own.
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: Arc<RwLock<BTreeMap<String, SecretKey>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and remember a keypair for `principal`, returning its public key.
    ///
    /// An existing key for the same principal is kept; generating twice
    /// returns the original public key.
    pub fn generate(
        &self,
        principal: &str,
        entropy: &dyn EntropySource,
    ) -> Result<PublicKey, KeyError> {
        let mut keys = self.keys.write();
        if let Some(existing) = keys.get(principal) {
            return Ok(existing.public());
        }
        let secret_key = SecretKey::generate(entropy)?;
        let public_key = secret_key.public();
        keys.insert(principal.to_string(), secret_key);
        Ok(public_key)
    }

    /// Insert a key for `principal`, replacing any previous one
    pub fn insert(&self, principal: &str, secret_key: SecretKey) {
        self.keys.write().insert(principal.to_string(), secret_key);
    }

    pub fn get(&self, principal: &str) -> Option<SecretKey> {
        self.keys.read().get(principal).cloned()
    }

    pub fn public_key(&self, principal: &str) -> Option<PublicKey> {
        self.keys.read().get(principal).map(SecretKey::public)
    }

    pub fn remove(&self, principal: &str) -> Option<SecretKey> {
        self.keys.write().remove(principal)
    }

    /// Names of every principal with a key in this store
    pub fn principals(&self) -> Vec<String> {
        self.keys.read().keys().cloned().collect()
    }
}
