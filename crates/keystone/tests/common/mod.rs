//! Shared test utilities for keystone integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use keystone::crypto::{EnvelopeEngine, KeyStore, SecretKey};
use keystone::keystone::{AccessController, KeystoneRepository, Principal};
use keystone::resolver::{MemoryNameResolver, NameResolver, Pointer, ResolverError};
use keystone::store::{Address, BlobsStore, MemoryKeystoneIndex};
use tempfile::TempDir;

pub type Controller = AccessController<BlobsStore, MemoryKeystoneIndex>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("keystone=debug")
        .with_test_writer()
        .try_init();
}

/// Set up an access controller over a filesystem blob store, plus the key
/// store it rotates with
pub async fn setup_controller() -> (Controller, KeyStore, TempDir) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let blob_path = temp_dir.path().join("blobs");
    let blobs = BlobsStore::fs(&blob_path).await.unwrap();

    let keys = KeyStore::new();
    let repository = KeystoneRepository::new(blobs, MemoryKeystoneIndex::new());
    let controller = AccessController::new(repository, EnvelopeEngine::default(), keys.clone());
    (controller, keys, temp_dir)
}

/// Generate (or reuse) a key for `name` and return it as a principal
pub fn principal(keys: &KeyStore, engine: &EnvelopeEngine, name: &str) -> Principal {
    let public_key = keys.generate(name, engine.entropy()).unwrap();
    Principal::new(name, public_key)
}

pub fn secret(keys: &KeyStore, name: &str) -> SecretKey {
    keys.get(name).unwrap()
}

/// A resolver whose lookups for some pointers never complete
#[derive(Debug, Clone, Default)]
pub struct StalledResolver {
    inner: MemoryNameResolver,
    stalled: Arc<HashSet<Pointer>>,
}

impl StalledResolver {
    pub fn new(inner: MemoryNameResolver, stalled: impl IntoIterator<Item = Pointer>) -> Self {
        Self {
            inner,
            stalled: Arc::new(stalled.into_iter().collect()),
        }
    }
}

#[async_trait]
impl NameResolver for StalledResolver {
    async fn publish(&self, address: &Address, key: &SecretKey) -> Result<Pointer, ResolverError> {
        self.inner.publish(address, key).await
    }

    async fn resolve(&self, pointer: &Pointer) -> Result<Address, ResolverError> {
        if self.stalled.contains(pointer) {
            return futures::future::pending().await;
        }
        self.inner.resolve(pointer).await
    }
}
