//! # Aggregation
//!
//! The [`Aggregator`] fans in the latest keystones of every service listed
//! in a [`ScopeIndex`] and seals the merged result into one
//! [`AggregationKeystone`].
//!
//! ```text
//!               ┌─ resolve(ptr_a) ─ fetch ─ open ─┐
//! ScopeIndex ───┼─ resolve(ptr_b) ─ fetch ─ open ─┼──> merge ──> seal ──> store ──> publish
//!               └─ resolve(ptr_c) ─ ✗ timeout ────┘        (c recorded as missing)
//! ```
//!
//! Each service is attempted concurrently, each step under its own
//! timeout. A service that times out, fails to resolve or fetch, or whose
//! keystone does not list the aggregator as a recipient is recorded in
//! `missing_services` and the round carries on. Only a scope index that
//! cannot be loaded fails the round.
//!
//! The merged object is keyed by service id, so arrival order never
//! affects the result.

mod merge;

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::codec::{BlockEncoded, CodecError};
use crate::config::AggregatorConfig;
use crate::crypto::{EnvelopeEngine, SecretKey};
use crate::keystone::{Keyring, KeyringError, Keystone, Principal};
use crate::registry::{RegistryError, ScopeIndex, ServiceDefinition};
use crate::resolver::{NameResolver, Pointer, ResolverError};
use crate::store::{get_block, put_block, Address, ContentStore, StoreError};

pub use merge::{Contribution, MergeError, MergedPayload};

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// The scope index could not be loaded; nothing to aggregate
    #[error("scope index unavailable: {0}")]
    ScopeIndex(#[from] RegistryError),
    #[error("aggregation cancelled")]
    Cancelled,
    #[error("sealing failed: {0}")]
    Sealing(#[from] KeyringError),
    #[error("unable to open aggregation: {0}")]
    Open(KeyringError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

/// Why one service was left out of a round
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("resolution timed out after {0:?}")]
    ResolutionTimeout(Duration),
    #[error("resolution failed: {0}")]
    Resolution(ResolverError),
    #[error("fetch timed out after {0:?}")]
    FetchTimeout(Duration),
    #[error("fetch failed: {0}")]
    Fetch(StoreError),
    #[error("access denied")]
    AccessDenied,
    #[error("unable to open keystone: {0}")]
    Open(KeyringError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// A service left out of an aggregation round, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingService {
    pub id: String,
    pub reason: String,
}

/// Cleartext record of what went into an aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationMetadata {
    /// Name of the aggregator that produced this round
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub scope_index_address: Address,
    /// Included service ids, in scope index order
    pub services_included: Vec<String>,
    /// Missing services, in scope index order
    pub missing_services: Vec<MissingService>,
    /// 1 for the first round, +1 per round
    pub aggregation_version: u64,
    /// Address of the previous round's aggregation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Address>,
}

/// A keystone whose payload is the merged output of many services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationKeystone {
    ciphertext: Bytes,
    keyring: Keyring,
    metadata: AggregationMetadata,
}

impl BlockEncoded for AggregationKeystone {}

impl AggregationKeystone {
    /// Decrypt and decode the merged payload as `principal`
    pub fn open(
        &self,
        principal: &str,
        secret_key: &SecretKey,
        engine: &EnvelopeEngine,
    ) -> Result<MergedPayload, AggregateError> {
        let data_key = self
            .keyring
            .open(principal, secret_key)
            .map_err(AggregateError::Open)?;
        let plaintext = engine
            .decrypt_payload(&data_key, &self.ciphertext)
            .map_err(|e| AggregateError::Open(KeyringError::DataKey(e)))?;
        Ok(MergedPayload::decode(&plaintext)?)
    }

    pub fn ciphertext(&self) -> &Bytes {
        &self.ciphertext
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    pub fn metadata(&self) -> &AggregationMetadata {
        &self.metadata
    }
}

/// Result of one aggregation round
#[derive(Debug, Clone)]
pub struct AggregationOutcome {
    pub keystone: AggregationKeystone,
    pub address: Address,
    /// The aggregator's pointer, now resolving to `address`
    pub pointer: Pointer,
}

/// State carried from one round to the next
#[derive(Debug, Default)]
struct RoundState {
    version: u64,
    previous: Option<Address>,
    /// Last contribution of every registered service, including ones that
    /// went missing since
    contributions: MergedPayload,
}

/// Fans in service keystones listed by a scope index
///
/// Rounds on one aggregator run one at a time; a second call to
/// [`Aggregator::aggregate`] waits for the first to finish.
#[derive(Debug)]
pub struct Aggregator<S, R> {
    store: S,
    resolver: R,
    engine: EnvelopeEngine,
    name: String,
    identity: SecretKey,
    scope_index_address: Address,
    config: AggregatorConfig,
    state: Mutex<RoundState>,
}

impl<S, R> Aggregator<S, R>
where
    S: ContentStore,
    R: NameResolver,
{
    pub fn new(
        name: impl Into<String>,
        identity: SecretKey,
        scope_index_address: Address,
        store: S,
        resolver: R,
        engine: EnvelopeEngine,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            engine,
            name: name.into(),
            identity,
            scope_index_address,
            config,
            state: Mutex::new(RoundState::default()),
        }
    }

    /// The principal producers must grant access to
    pub fn principal(&self) -> Principal {
        Principal::new(self.name.clone(), self.identity.public())
    }

    pub fn pointer(&self) -> Pointer {
        Pointer::from(self.identity.public())
    }

    pub fn scope_index_address(&self) -> &Address {
        &self.scope_index_address
    }

    /// Point later rounds at a newer scope index
    pub fn set_scope_index_address(&mut self, address: Address) {
        self.scope_index_address = address;
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub async fn aggregate(
        &self,
        recipients: &[Principal],
    ) -> Result<AggregationOutcome, AggregateError> {
        self.aggregate_with_cancel(recipients, CancellationToken::new())
            .await
    }

    /// Run a round that stops as soon as `cancel` fires
    ///
    /// In-flight resolves and fetches are dropped and nothing from the
    /// cancelled round is carried into the next.
    pub async fn aggregate_with_cancel(
        &self,
        recipients: &[Principal],
        cancel: CancellationToken,
    ) -> Result<AggregationOutcome, AggregateError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("aggregation by {} cancelled", self.name);
                Err(AggregateError::Cancelled)
            }
            result = self.round(recipients) => result,
        }
    }

    async fn round(&self, recipients: &[Principal]) -> Result<AggregationOutcome, AggregateError> {
        let mut state = self.state.lock().await;

        let index = ScopeIndex::load(&self.scope_index_address, &self.store).await?;
        tracing::info!(
            "aggregating {} services from scope index version {}",
            index.services().len(),
            index.version()
        );

        let attempts = index.services().iter().map(|service| async move {
            let result = self.collect(service).await;
            (service, result)
        });
        let results = join_all(attempts).await;

        let mut contributions = MergedPayload::default();
        let mut merged = MergedPayload::default();
        let mut services_included = Vec::new();
        let mut missing_services = Vec::new();

        for (service, result) in results {
            let previous = state.contributions.get(&service.id);
            let merged_result = result.and_then(|payload| {
                Contribution::merge(&service.policy, previous, payload).map_err(ServiceError::from)
            });
            match merged_result {
                Ok(contribution) => {
                    tracing::debug!("service {} included", service.id);
                    services_included.push(service.id.clone());
                    merged.insert(service.id.clone(), contribution.clone());
                    contributions.insert(service.id.clone(), contribution);
                }
                Err(err) => {
                    tracing::warn!("service {} missing from aggregation: {}", service.id, err);
                    if let Some(previous) = previous {
                        contributions.insert(service.id.clone(), previous.clone());
                    }
                    missing_services.push(MissingService {
                        id: service.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let data_key = self.engine.generate_data_key().map_err(KeyringError::from)?;
        let ciphertext = self
            .engine
            .encrypt_payload(&data_key, &merged.encode()?)
            .map_err(KeyringError::from)?;
        let keyring = Keyring::seal(&data_key, recipients, &self.engine)?;

        let aggregation_version = state.version + 1;
        let keystone = AggregationKeystone {
            ciphertext: Bytes::from(ciphertext),
            keyring,
            metadata: AggregationMetadata {
                owner: self.name.clone(),
                created_at: Utc::now(),
                scope_index_address: self.scope_index_address,
                services_included,
                missing_services,
                aggregation_version,
                previous: state.previous,
            },
        };

        let address = put_block(&self.store, &keystone).await?;
        let pointer = self.resolver.publish(&address, &self.identity).await?;

        state.version = aggregation_version;
        state.previous = Some(address);
        state.contributions = contributions;

        tracing::info!(
            "aggregation {} stored at {}: {} included, {} missing",
            aggregation_version,
            address,
            keystone.metadata.services_included.len(),
            keystone.metadata.missing_services.len()
        );
        Ok(AggregationOutcome {
            keystone,
            address,
            pointer,
        })
    }

    /// Resolve, fetch and open one service's latest keystone
    async fn collect(&self, service: &ServiceDefinition) -> Result<Bytes, ServiceError> {
        let resolve_timeout = self.config.resolve_timeout();
        let address = tokio::time::timeout(resolve_timeout, self.resolver.resolve(&service.pointer))
            .await
            .map_err(|_| ServiceError::ResolutionTimeout(resolve_timeout))?
            .map_err(ServiceError::Resolution)?;

        let fetch_timeout = self.config.fetch_timeout();
        let keystone: Keystone =
            tokio::time::timeout(fetch_timeout, get_block(&self.store, &address))
                .await
                .map_err(|_| ServiceError::FetchTimeout(fetch_timeout))?
                .map_err(ServiceError::Fetch)?;

        let payload = keystone
            .open(&self.name, &self.identity, &self.engine)
            .map_err(|err| match err {
                KeyringError::PrincipalNotFound(_) => ServiceError::AccessDenied,
                err => ServiceError::Open(err),
            })?;
        Ok(Bytes::from(payload))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::MergePolicy;
    use crate::resolver::MemoryNameResolver;
    use crate::store::MemoryContentStore;

    #[tokio::test]
    async fn test_missing_scope_index_is_fatal() {
        let engine = EnvelopeEngine::default();
        let identity = SecretKey::generate(engine.entropy()).unwrap();
        let aggregator = Aggregator::new(
            "aggregator",
            identity,
            Address::for_content(b"nowhere"),
            MemoryContentStore::new(),
            MemoryNameResolver::new(),
            engine,
            AggregatorConfig::default(),
        );
        assert!(matches!(
            aggregator.aggregate(&[]).await,
            Err(AggregateError::ScopeIndex(_))
        ));
    }

    #[tokio::test]
    async fn test_unpublished_and_unreadable_services_are_missing() {
        let store = MemoryContentStore::new();
        let resolver = MemoryNameResolver::new();
        let engine = EnvelopeEngine::default();
        let identity = SecretKey::generate(engine.entropy()).unwrap();

        // a service that publishes without granting the aggregator access
        let private_key = SecretKey::generate(engine.entropy()).unwrap();
        let private = Keystone::seal(
            b"secret",
            [&Principal::new("private", private_key.public())],
            crate::keystone::KeystoneMetadata::new("private", "private"),
            &engine,
        )
        .unwrap();
        let address = put_block(&store, &private).await.unwrap();
        let private_pointer = resolver.publish(&address, &private_key).await.unwrap();

        let silent = Pointer::from(SecretKey::generate(engine.entropy()).unwrap().public());
        let index = ScopeIndex::create("owner")
            .add_service(ServiceDefinition::new(
                "private",
                private_pointer,
                ["x"],
                MergePolicy::Replace,
            ))
            .unwrap()
            .add_service(ServiceDefinition::new(
                "silent",
                silent,
                ["x"],
                MergePolicy::Replace,
            ))
            .unwrap();
        let index_address = index.publish(&store).await.unwrap();

        let aggregator = Aggregator::new(
            "aggregator",
            identity,
            index_address,
            store,
            resolver,
            engine,
            AggregatorConfig::default(),
        );
        let outcome = aggregator.aggregate(&[aggregator.principal()]).await.unwrap();
        let metadata = outcome.keystone.metadata();

        assert!(metadata.services_included.is_empty());
        assert_eq!(
            metadata.missing_services,
            vec![
                MissingService {
                    id: "private".to_string(),
                    reason: "access denied".to_string(),
                },
                MissingService {
                    id: "silent".to_string(),
                    reason: format!(
                        "resolution failed: nothing published under pointer {}",
                        silent
                    ),
                },
            ]
        );
        assert_eq!(outcome.pointer, aggregator.pointer());
    }
}
