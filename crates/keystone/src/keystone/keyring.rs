use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{
    DataKey, DataKeyError, EnvelopeEngine, PublicKey, SecretKey, WrapError, WrappedKey,
};

/// Errors raised while sealing or opening through a keyring
#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("principal {0} has no keyring entry")]
    PrincipalNotFound(String),
    #[error(transparent)]
    Wrap(#[from] WrapError),
    #[error(transparent)]
    DataKey(#[from] DataKeyError),
}

/// A named identity that can be granted access
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub public_key: PublicKey,
}

impl Principal {
    pub fn new(name: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            public_key,
        }
    }
}

/// One principal's wrapped copy of a data key
///
/// The public key is kept next to the wrap so the keyring can be re-wrapped
/// for the same principals after a rotation without their private keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringEntry {
    principal: String,
    public_key: PublicKey,
    wrapped_key: WrappedKey,
}

impl KeyringEntry {
    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn wrapped_key(&self) -> &WrappedKey {
        &self.wrapped_key
    }
}

/// The set of wrapped data keys for a keystone, one per principal
///
/// Keyed by principal name, so there is never more than one entry per
/// principal. Principal names are stored in the clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyring(BTreeMap<String, KeyringEntry>);

impl Keyring {
    /// Wrap `data_key` for every principal in `principals`.
    ///
    /// A principal listed twice keeps the last public key given.
    pub fn seal<'a>(
        data_key: &DataKey,
        principals: impl IntoIterator<Item = &'a Principal>,
        engine: &EnvelopeEngine,
    ) -> Result<Self, KeyringError> {
        let mut keyring = Keyring::default();
        for principal in principals {
            keyring.grant(data_key, principal, engine)?;
        }
        Ok(keyring)
    }

    /// Wrap `data_key` for `principal` and add (or replace) its entry
    pub fn grant(
        &mut self,
        data_key: &DataKey,
        principal: &Principal,
        engine: &EnvelopeEngine,
    ) -> Result<(), KeyringError> {
        let wrapped_key = engine.wrap_key(data_key, &principal.public_key)?;
        self.0.insert(
            principal.name.clone(),
            KeyringEntry {
                principal: principal.name.clone(),
                public_key: principal.public_key,
                wrapped_key,
            },
        );
        Ok(())
    }

    /// Wrap a new data key for exactly the principals already present
    pub fn rewrap(
        &self,
        data_key: &DataKey,
        engine: &EnvelopeEngine,
    ) -> Result<Self, KeyringError> {
        let principals: Vec<Principal> = self.principals_with_keys().collect();
        Keyring::seal(data_key, principals.iter(), engine)
    }

    /// Recover the data key through `principal`'s entry
    pub fn open(&self, principal: &str, secret_key: &SecretKey) -> Result<DataKey, KeyringError> {
        let entry = self
            .0
            .get(principal)
            .ok_or_else(|| KeyringError::PrincipalNotFound(principal.to_string()))?;
        Ok(entry.wrapped_key.unwrap_key(secret_key)?)
    }

    pub fn entry(&self, principal: &str) -> Option<&KeyringEntry> {
        self.0.get(principal)
    }

    pub fn contains(&self, principal: &str) -> bool {
        self.0.contains_key(principal)
    }

    pub fn remove(&mut self, principal: &str) -> Option<KeyringEntry> {
        self.0.remove(principal)
    }

    /// Principal names, in sorted order
    pub fn principals(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn principals_with_keys(&self) -> impl Iterator<Item = Principal> + '_ {
        self.0
            .values()
            .map(|entry| Principal::new(entry.principal.clone(), entry.public_key))
    }

    pub fn entries(&self) -> impl Iterator<Item = &KeyringEntry> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
