//! # Scope Index
//!
//! The owner's registry of authorized producers. Each [`ServiceDefinition`]
//! names a producer's resolution [`Pointer`], the scopes it writes to and
//! how the aggregator merges its payloads.
//!
//! A [`ScopeIndex`] is a value. Every mutating operation borrows the
//! current index and returns a new one with `version` incremented, so a
//! published chain of indexes is an auditable history:
//!
//! ```text
//! v0 ──add_service(a)──> v1 ──add_service(b)──> v2 ──remove_service(a)──> v3
//! ```

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::BlockEncoded;
use crate::resolver::Pointer;
use crate::store::{get_block, put_block, Address, ContentStore, StoreError};

/// Type tag carried by every serialized scope index
pub const SCOPE_INDEX_TYPE: &str = "keystone/scope-index";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid scope index: {0}")]
    Validation(String),
    #[error("service already registered: {0}")]
    DuplicateService(String),
    #[error("service not registered: {0}")]
    ServiceNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How the aggregator folds a producer's payloads into the merged object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Payload is a JSON object of record id -> record, upserted into
    /// the records carried over from the previous round
    ById,
    /// Keep a history of distinct payloads, newest last, trimmed to
    /// `retention` entries when set
    Append {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retention: Option<u64>,
    },
    /// Only the latest payload is kept
    #[default]
    Replace,
}

/// An authorized producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: String,
    /// Where the producer publishes its latest keystone
    pub pointer: Pointer,
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub policy: MergePolicy,
}

impl ServiceDefinition {
    pub fn new<S: Into<String>>(
        id: impl Into<String>,
        pointer: Pointer,
        scopes: impl IntoIterator<Item = S>,
        policy: MergePolicy,
    ) -> Self {
        Self {
            id: id.into(),
            pointer,
            scopes: scopes.into_iter().map(Into::into).collect(),
            policy,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// A versioned, immutable registry of authorized services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeIndex {
    #[serde(rename = "type")]
    kind: String,
    owner: String,
    created_at: DateTime<Utc>,
    version: u64,
    services: Vec<ServiceDefinition>,
}

impl BlockEncoded for ScopeIndex {}

impl ScopeIndex {
    /// An empty index at version 0
    pub fn create(owner: impl Into<String>) -> Self {
        Self {
            kind: SCOPE_INDEX_TYPE.to_string(),
            owner: owner.into(),
            created_at: Utc::now(),
            version: 0,
            services: Vec::new(),
        }
    }

    fn next(&self, services: Vec<ServiceDefinition>) -> Self {
        Self {
            kind: self.kind.clone(),
            owner: self.owner.clone(),
            created_at: self.created_at,
            version: self.version + 1,
            services,
        }
    }

    /// Append `service` to the end of the service list
    pub fn add_service(&self, service: ServiceDefinition) -> Result<Self, RegistryError> {
        if self.get_service(&service.id).is_some() {
            return Err(RegistryError::DuplicateService(service.id));
        }
        let mut services = self.services.clone();
        services.push(service);
        Ok(self.next(services))
    }

    pub fn remove_service(&self, id: &str) -> Result<Self, RegistryError> {
        if self.get_service(id).is_none() {
            return Err(RegistryError::ServiceNotFound(id.to_string()));
        }
        let services = self
            .services
            .iter()
            .filter(|service| service.id != id)
            .cloned()
            .collect();
        Ok(self.next(services))
    }

    /// Replace the definition with the same id, keeping its position
    pub fn update_service(&self, service: ServiceDefinition) -> Result<Self, RegistryError> {
        let position = self
            .services
            .iter()
            .position(|existing| existing.id == service.id)
            .ok_or_else(|| RegistryError::ServiceNotFound(service.id.clone()))?;
        let mut services = self.services.clone();
        services[position] = service;
        Ok(self.next(services))
    }

    pub fn get_service(&self, id: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|service| service.id == id)
    }

    pub fn services_with_scope<'a>(
        &'a self,
        scope: &'a str,
    ) -> impl Iterator<Item = &'a ServiceDefinition> + 'a {
        self.services
            .iter()
            .filter(move |service| service.has_scope(scope))
    }

    /// Services in registration order
    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Check the structural rules every published index must satisfy
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.kind != SCOPE_INDEX_TYPE {
            return Err(RegistryError::Validation(format!(
                "unexpected type tag {:?}",
                self.kind
            )));
        }
        if self.owner.trim().is_empty() {
            return Err(RegistryError::Validation("owner is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.id.is_empty() {
                return Err(RegistryError::Validation("service id is empty".to_string()));
            }
            if !seen.insert(service.id.as_str()) {
                return Err(RegistryError::Validation(format!(
                    "duplicate service id {}",
                    service.id
                )));
            }
            if service.scopes.is_empty() || service.scopes.iter().any(|s| s.is_empty()) {
                return Err(RegistryError::Validation(format!(
                    "service {} has no scopes",
                    service.id
                )));
            }
            if let MergePolicy::Append { retention: Some(0) } = service.policy {
                return Err(RegistryError::Validation(format!(
                    "service {} has zero retention",
                    service.id
                )));
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Validate and store the index, returning its content address
    ///
    /// An invalid index is rejected before anything is written.
    pub async fn publish<S: ContentStore>(&self, store: &S) -> Result<Address, RegistryError> {
        self.validate()?;
        let address = put_block(store, self).await?;
        tracing::info!(
            "published scope index version {} with {} services at {}",
            self.version,
            self.services.len(),
            address
        );
        Ok(address)
    }

    /// Fetch and validate the index stored at `address`
    pub async fn load<S: ContentStore>(address: &Address, store: &S) -> Result<Self, RegistryError> {
        let index: ScopeIndex = get_block(store, address).await?;
        index.validate()?;
        Ok(index)
    }
}
