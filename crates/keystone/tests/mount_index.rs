//! Integration tests for resolving paths through a published mount index

mod common;

use keystone::codec::BlockEncoded;
use keystone::crypto::EnvelopeEngine;
use keystone::keystone::Keystone;
use keystone::mount::MountIndex;
use keystone::node::WriteNode;
use keystone::resolver::{MemoryNameResolver, NameResolver};
use keystone::store::{BlobsStore, ContentStore};

#[tokio::test]
async fn test_path_resolves_to_latest_keystone() {
    common::init_tracing();
    let store = BlobsStore::memory().await.unwrap();
    let resolver = MemoryNameResolver::new();
    let engine = EnvelopeEngine::default();
    let reader = engine.generate_key_pair().unwrap();
    let recipients = [keystone::keystone::Principal::new("reader", reader.public_key)];

    let mut docs = WriteNode::new(
        "docs",
        "example.org",
        store.clone(),
        resolver.clone(),
        engine.clone(),
    );
    let mut photos = WriteNode::new(
        "photos",
        "example.org",
        store.clone(),
        resolver.clone(),
        engine.clone(),
    );
    let docs_pointer = docs.generate_identity_key().unwrap();
    let photos_pointer = photos.generate_identity_key().unwrap();

    docs.publish(b"readme", &recipients).await.unwrap();
    photos.publish(b"cat.jpg", &recipients).await.unwrap();
    docs.publish(b"readme v2", &recipients).await.unwrap();

    let index = MountIndex::new()
        .add_mount("/shared", docs_pointer)
        .add_mount("/shared/photos", photos_pointer);
    let address = index.publish(&store).await.unwrap();
    let loaded = MountIndex::load(&address, &store).await.unwrap();

    let pointer = loaded.resolve_path("/shared/notes/today").unwrap();
    assert_eq!(pointer, docs_pointer);
    assert_eq!(
        loaded.resolve_path("/shared/photos/2024"),
        Some(photos_pointer)
    );
    assert_eq!(loaded.resolve_path("/private"), None);

    let latest = resolver.resolve(&pointer).await.unwrap();
    let bytes = store.get(&latest).await.unwrap();
    let keystone = Keystone::decode(&bytes).unwrap();
    assert_eq!(
        keystone
            .open("reader", &reader.secret_key, &engine)
            .unwrap(),
        b"readme v2".to_vec()
    );
}
