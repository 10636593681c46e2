//! # Write nodes
//!
//! A [`WriteNode`] is one independent producer. It owns a name-resolution
//! key, seals each payload into a fresh keystone, stores it, and moves its
//! own [`Pointer`] to the new address. Nothing else can move that pointer,
//! so consumers (the aggregator) only need the pointer to follow a
//! producer's latest output.

use crate::crypto::{EnvelopeEngine, KeyError, SecretKey};
use crate::keystone::{Keystone, KeystoneMetadata, KeyringError, Principal};
use crate::resolver::{NameResolver, Pointer, ResolverError};
use crate::store::{put_block, Address, ContentStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WriteNodeError {
    #[error("write node {0} has no identity key")]
    NoIdentity(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("sealing failed: {0}")]
    Sealing(#[from] KeyringError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

/// Where a publish landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub content_address: Address,
    pub pointer: Pointer,
    /// Local version of the published keystone
    pub version: u64,
}

/// An independent producer publishing under its own pointer
#[derive(Debug)]
pub struct WriteNode<S, R> {
    service_id: String,
    domain: String,
    store: S,
    resolver: R,
    engine: EnvelopeEngine,
    name_key: Option<SecretKey>,
    version: u64,
    latest: Option<PublishOutcome>,
}

impl<S, R> WriteNode<S, R>
where
    S: ContentStore,
    R: NameResolver,
{
    /// A node without an identity key; call
    /// [`WriteNode::generate_identity_key`] before publishing
    pub fn new(
        service_id: impl Into<String>,
        domain: impl Into<String>,
        store: S,
        resolver: R,
        engine: EnvelopeEngine,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            domain: domain.into(),
            store,
            resolver,
            engine,
            name_key: None,
            version: 0,
            latest: None,
        }
    }

    /// Restore a node around a key it already published with
    pub fn with_identity(
        service_id: impl Into<String>,
        domain: impl Into<String>,
        store: S,
        resolver: R,
        engine: EnvelopeEngine,
        name_key: SecretKey,
    ) -> Self {
        let mut node = Self::new(service_id, domain, store, resolver, engine);
        node.name_key = Some(name_key);
        node
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Version the next publish will carry
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn latest(&self) -> Option<&PublishOutcome> {
        self.latest.as_ref()
    }

    pub fn has_identity(&self) -> bool {
        self.name_key.is_some()
    }

    /// Create the node's name key, once
    ///
    /// If a key already exists it is kept and its pointer returned.
    /// Replacing it would orphan every pointer published so far.
    pub fn generate_identity_key(&mut self) -> Result<Pointer, WriteNodeError> {
        if let Some(key) = &self.name_key {
            return Ok(Pointer::from(key.public()));
        }
        let key = SecretKey::generate(self.engine.entropy())?;
        let pointer = Pointer::from(key.public());
        self.name_key = Some(key);
        tracing::info!("write node {} created identity {}", self.service_id, pointer);
        Ok(pointer)
    }

    pub fn export_public_pointer(&self) -> Result<Pointer, WriteNodeError> {
        self.identity().map(|key| Pointer::from(key.public()))
    }

    /// The principal this node seals its own keystones for
    pub fn principal(&self) -> Result<Principal, WriteNodeError> {
        let key = self.identity()?;
        Ok(Principal::new(self.service_id.clone(), key.public()))
    }

    fn identity(&self) -> Result<&SecretKey, WriteNodeError> {
        self.name_key
            .as_ref()
            .ok_or_else(|| WriteNodeError::NoIdentity(self.service_id.clone()))
    }

    /// Seal `payload` for `recipients`, store it and move the pointer
    ///
    /// The node itself is always a recipient, as the keystone's owner.
    pub async fn publish(
        &mut self,
        payload: &[u8],
        recipients: &[Principal],
    ) -> Result<PublishOutcome, WriteNodeError> {
        let owner = self.principal()?;

        let mut metadata = KeystoneMetadata::new(self.service_id.clone(), owner.name.clone());
        metadata.version = self.version;
        metadata.previous = self.latest.map(|latest| latest.content_address);

        let principals = std::iter::once(&owner).chain(recipients.iter());
        let keystone = Keystone::seal(payload, principals, metadata, &self.engine)?;
        let content_address = put_block(&self.store, &keystone).await?;

        let key = self.identity()?;
        let pointer = self.resolver.publish(&content_address, key).await?;

        let outcome = PublishOutcome {
            content_address,
            pointer,
            version: self.version,
        };
        self.version += 1;
        self.latest = Some(outcome);

        tracing::info!(
            "write node {} published version {} at {} for {} recipients",
            self.service_id,
            outcome.version,
            content_address,
            keystone.keyring().len()
        );
        Ok(outcome)
    }
}
