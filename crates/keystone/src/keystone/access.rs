//! Grant, revoke and rotate access to keystones
//!
//! Every logical id moves through `Absent -> Live -> Deleted`. While live,
//! its keyring grows and shrinks; the id itself is only removed by
//! [`AccessController::delete`].
//!
//! Mutations read the current version, build a new one and store it. There
//! is no optimistic-concurrency token: two callers mutating the same id at
//! once race, and the last store wins.

use bytes::Bytes;

use crate::crypto::{DataKeyError, EnvelopeEngine, KeyStore, PublicKey, SecretKey, WrapError};
use crate::store::{Address, ContentStore, KeystoneIndex, StoreError};

use super::keyring::{Keyring, KeyringError, Principal};
use super::repository::KeystoneRepository;
use super::{Keystone, KeystoneMetadata};

/// The failure classes callers can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Unwrap,
    Decryption,
    Validation,
    Crypto,
    Transport,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The logical id (or the content it points at) does not exist
    #[error("keystone not found: {0}")]
    NotFound(String),
    /// The principal has no usable keyring entry
    #[error("recipient not found: {0}")]
    AccessDenied(String),
    #[error("unable to unwrap data key")]
    Unwrap,
    #[error("payload decryption failed: {0}")]
    Decryption(DataKeyError),
    #[error("invalid request: {0}")]
    Validation(String),
    /// Sealing failed (entropy or key-wrapping for a recipient)
    #[error("sealing failed: {0}")]
    Crypto(KeyringError),
    #[error("transport error: {0}")]
    Transport(StoreError),
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::NotFound(_) => ErrorKind::NotFound,
            AccessError::AccessDenied(_) => ErrorKind::AccessDenied,
            AccessError::Unwrap => ErrorKind::Unwrap,
            AccessError::Decryption(_) => ErrorKind::Decryption,
            AccessError::Validation(_) => ErrorKind::Validation,
            AccessError::Crypto(_) => ErrorKind::Crypto,
            AccessError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Classify an error raised while opening a keystone
    fn opening(err: KeyringError) -> Self {
        match err {
            KeyringError::PrincipalNotFound(principal) => AccessError::AccessDenied(principal),
            KeyringError::Wrap(_) => AccessError::Unwrap,
            KeyringError::DataKey(err) => AccessError::Decryption(err),
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(address) => AccessError::NotFound(address.to_string()),
            err => AccessError::Transport(err),
        }
    }
}

impl From<KeyringError> for AccessError {
    fn from(err: KeyringError) -> Self {
        AccessError::Crypto(err)
    }
}

impl From<WrapError> for AccessError {
    fn from(err: WrapError) -> Self {
        AccessError::Crypto(KeyringError::Wrap(err))
    }
}

/// Access control operations over a [`KeystoneRepository`]
///
/// The controller owns every data key it creates: generate, wrap for each
/// recipient, drop. The [`KeyStore`] is consulted only when a rotation has
/// to decrypt the current payload on the caller's behalf.
#[derive(Debug, Clone)]
pub struct AccessController<S, I> {
    repository: KeystoneRepository<S, I>,
    engine: EnvelopeEngine,
    keys: KeyStore,
}

impl<S, I> AccessController<S, I>
where
    S: ContentStore,
    I: KeystoneIndex,
{
    pub fn new(repository: KeystoneRepository<S, I>, engine: EnvelopeEngine, keys: KeyStore) -> Self {
        Self {
            repository,
            engine,
            keys,
        }
    }

    pub fn repository(&self) -> &KeystoneRepository<S, I> {
        &self.repository
    }

    pub fn engine(&self) -> &EnvelopeEngine {
        &self.engine
    }

    async fn current(&self, id: &str) -> Result<(Address, Keystone), AccessError> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| AccessError::NotFound(id.to_string()))
    }

    /// Encrypt `payload` for `owner` and `recipients` under a brand-new data key
    ///
    /// Writing over a live id is a full rotation: the previous keyring is
    /// discarded and replaced by exactly the principals given here.
    pub async fn write(
        &self,
        id: &str,
        payload: &[u8],
        owner: &Principal,
        recipients: &[Principal],
    ) -> Result<(Address, Keystone), AccessError> {
        let metadata = match self.repository.get(id).await? {
            Some((address, existing)) => {
                let mut metadata = existing.metadata().advance(address);
                metadata.owner = owner.name.clone();
                metadata
            }
            None => KeystoneMetadata::new(id, owner.name.clone()),
        };

        let principals = std::iter::once(owner).chain(recipients.iter());
        let keystone = Keystone::seal(payload, principals, metadata, &self.engine)?;
        let address = self.repository.put(id, &keystone).await?;

        tracing::info!(
            "wrote keystone {} (version {}) for {} principals",
            id,
            keystone.version(),
            keystone.keyring().len()
        );
        Ok((address, keystone))
    }

    /// Decrypt the latest payload of `id` as `principal`
    pub async fn read(
        &self,
        id: &str,
        principal: &str,
        secret_key: &SecretKey,
    ) -> Result<Vec<u8>, AccessError> {
        let (_, keystone) = self.current(id).await?;
        keystone
            .open(principal, secret_key, &self.engine)
            .map_err(AccessError::opening)
    }

    /// Remove `principal` and rotate the data key
    ///
    /// The current payload is decrypted through the first keyring entry the
    /// key store can open (the owner's when available), re-encrypted under
    /// a fresh data key and wrapped for every remaining principal. Wraps
    /// cached by the revoked principal do not open the new ciphertext.
    pub async fn revoke(&self, id: &str, principal: &str) -> Result<(Address, Keystone), AccessError> {
        let (address, current) = self.current(id).await?;
        Self::check_revocable(&current, principal)?;

        let payload = self.open_with_store(&current, principal)?;

        let mut keyring = current.keyring().clone();
        keyring.remove(principal);

        let data_key = self.engine.generate_data_key().map_err(KeyringError::from)?;
        let keyring = keyring.rewrap(&data_key, &self.engine)?;
        let keystone = Keystone::seal_with(
            &payload,
            &data_key,
            keyring,
            current.metadata().advance(address),
            &self.engine,
        )?;
        let address = self.repository.put(id, &keystone).await?;

        tracing::info!(
            "revoked {} from keystone {} with key rotation (version {})",
            principal,
            id,
            keystone.version()
        );
        Ok((address, keystone))
    }

    /// Remove `principal`'s keyring entry WITHOUT rotating the data key
    ///
    /// The ciphertext is left untouched. A principal that already unwrapped
    /// (or cached) the data key can still decrypt this and earlier
    /// versions. Prefer [`AccessController::revoke`].
    pub async fn soft_revoke(
        &self,
        id: &str,
        principal: &str,
    ) -> Result<(Address, Keystone), AccessError> {
        let (address, current) = self.current(id).await?;
        Self::check_revocable(&current, principal)?;

        let mut keyring = current.keyring().clone();
        keyring.remove(principal);
        let keystone = Keystone::from_parts(
            current.ciphertext().clone(),
            keyring,
            current.metadata().advance(address),
        );
        let address = self.repository.put(id, &keystone).await?;

        tracing::warn!(
            "soft-revoked {} from keystone {} without rotation (version {})",
            principal,
            id,
            keystone.version()
        );
        Ok((address, keystone))
    }

    /// Wrap the current data key for `principal`, recovering it through
    /// the owner's entry. Does not rotate.
    pub async fn re_grant(
        &self,
        id: &str,
        principal: &str,
        public_key: &PublicKey,
        owner_key: &SecretKey,
    ) -> Result<(Address, Keystone), AccessError> {
        let (address, current) = self.current(id).await?;

        let data_key = current
            .data_key(current.owner(), owner_key)
            .map_err(AccessError::opening)?;

        let mut keyring = current.keyring().clone();
        keyring.grant(&data_key, &Principal::new(principal, *public_key), &self.engine)?;
        let keystone = Keystone::from_parts(
            current.ciphertext().clone(),
            keyring,
            current.metadata().advance(address),
        );
        let address = self.repository.put(id, &keystone).await?;

        tracing::info!(
            "granted {} access to keystone {} (version {})",
            principal,
            id,
            keystone.version()
        );
        Ok((address, keystone))
    }

    /// Replace the payload of `id`, rotating the data key and re-wrapping it
    /// for the current keyring
    pub async fn update(
        &self,
        id: &str,
        payload: &[u8],
        owner: &str,
    ) -> Result<(Address, Keystone), AccessError> {
        let (address, current) = self.current(id).await?;
        if current.owner() != owner {
            return Err(AccessError::AccessDenied(owner.to_string()));
        }

        let data_key = self.engine.generate_data_key().map_err(KeyringError::from)?;
        let keyring = current.keyring().rewrap(&data_key, &self.engine)?;
        let keystone = Keystone::seal_with(
            payload,
            &data_key,
            keyring,
            current.metadata().advance(address),
            &self.engine,
        )?;
        let address = self.repository.put(id, &keystone).await?;

        tracing::info!("updated keystone {} (version {})", id, keystone.version());
        Ok((address, keystone))
    }

    /// Names of every principal with a keyring entry on `id`
    pub async fn list_recipients(&self, id: &str) -> Result<Vec<String>, AccessError> {
        let (_, keystone) = self.current(id).await?;
        Ok(keystone.keyring().principals())
    }

    pub async fn get_metadata(&self, id: &str) -> Result<Option<KeystoneMetadata>, AccessError> {
        Ok(self
            .repository
            .get(id)
            .await?
            .map(|(_, keystone)| keystone.metadata().clone()))
    }

    /// Drop the pointer for `id`. Previously stored versions remain
    /// addressable but unreferenced.
    pub async fn delete(&self, id: &str) -> Result<Address, AccessError> {
        let address = self
            .repository
            .delete(id)
            .await?
            .ok_or_else(|| AccessError::NotFound(id.to_string()))?;
        tracing::info!("deleted keystone {}", id);
        Ok(address)
    }

    fn check_revocable(current: &Keystone, principal: &str) -> Result<(), AccessError> {
        if !current.keyring().contains(principal) {
            return Err(AccessError::AccessDenied(principal.to_string()));
        }
        if current.owner() == principal {
            return Err(AccessError::Validation(format!(
                "cannot revoke the owner {} of keystone {}",
                principal,
                current.metadata().id
            )));
        }
        Ok(())
    }

    /// Decrypt `keystone` through any keyring entry the key store holds a
    /// key for, owner first, never through `excluded`
    ///
    /// A stale key moves on to the next candidate. The last failure is
    /// returned only when no candidate opens the keystone.
    fn open_with_store(&self, keystone: &Keystone, excluded: &str) -> Result<Bytes, AccessError> {
        let owner = keystone.owner().to_string();
        let candidates = std::iter::once(owner.clone()).chain(
            keystone
                .keyring()
                .principals()
                .into_iter()
                .filter(|name| *name != owner),
        );

        let mut last_error = None;
        for candidate in candidates.filter(|name| name != excluded) {
            let Some(secret_key) = self.keys.get(&candidate) else {
                continue;
            };
            match keystone.open(&candidate, &secret_key, &self.engine) {
                Ok(payload) => return Ok(Bytes::from(payload)),
                Err(KeyringError::PrincipalNotFound(_)) => continue,
                Err(err) => {
                    tracing::warn!(
                        "key store entry for {} failed to open keystone {}: {}",
                        candidate,
                        keystone.metadata().id,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .map(AccessError::opening)
            .unwrap_or(AccessError::AccessDenied(owner)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{MemoryContentStore, MemoryKeystoneIndex};

    type Controller = AccessController<MemoryContentStore, MemoryKeystoneIndex>;

    fn setup() -> (Controller, KeyStore) {
        let keys = KeyStore::new();
        let repository =
            KeystoneRepository::new(MemoryContentStore::new(), MemoryKeystoneIndex::new());
        let controller = AccessController::new(repository, EnvelopeEngine::default(), keys.clone());
        (controller, keys)
    }

    fn principal(controller: &Controller, keys: &KeyStore, name: &str) -> Principal {
        let public_key = keys.generate(name, controller.engine().entropy()).unwrap();
        Principal::new(name, public_key)
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found() {
        let (controller, keys) = setup();
        let alice = principal(&controller, &keys, "alice");
        let err = controller
            .read("nope", "alice", &keys.get("alice").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(controller.revoke("nope", &alice.name).await.is_err());
        assert!(controller.get_metadata("nope").await.unwrap().is_none());
        assert_eq!(
            controller.delete("nope").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_owner_cannot_be_revoked() {
        let (controller, keys) = setup();
        let owner = principal(&controller, &keys, "owner");
        controller.write("doc", b"data", &owner, &[]).await.unwrap();

        let err = controller.revoke("doc", "owner").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_revoke_unknown_principal_is_denied() {
        let (controller, keys) = setup();
        let owner = principal(&controller, &keys, "owner");
        controller.write("doc", b"data", &owner, &[]).await.unwrap();

        let err = controller.revoke("doc", "mallory").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_revoke_without_any_usable_key_is_denied() {
        let (controller, keys) = setup();
        let owner = principal(&controller, &keys, "owner");
        let bob = principal(&controller, &keys, "bob");
        controller.write("doc", b"data", &owner, &[bob]).await.unwrap();

        keys.remove("owner");
        keys.remove("bob");
        let err = controller.revoke("doc", "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_wrong_key_is_unwrap_error() {
        let (controller, keys) = setup();
        let owner = principal(&controller, &keys, "owner");
        let bob = principal(&controller, &keys, "bob");
        controller.write("doc", b"data", &owner, &[bob]).await.unwrap();

        let err = controller
            .read("doc", "owner", &keys.get("bob").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unwrap);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_is_decryption_error() {
        let (controller, keys) = setup();
        let owner = principal(&controller, &keys, "owner");
        let (address, stored) = controller.write("doc", b"data", &owner, &[]).await.unwrap();

        let mut ciphertext = stored.ciphertext().to_vec();
        if let Some(last) = ciphertext.last_mut() {
            *last ^= 0xff;
        }
        let tampered = Keystone::from_parts(
            Bytes::from(ciphertext),
            stored.keyring().clone(),
            stored.metadata().advance(address),
        );
        controller.repository().put("doc", &tampered).await.unwrap();

        let err = controller
            .read("doc", "owner", &keys.get("owner").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decryption);
    }

    #[tokio::test]
    async fn test_revoke_reports_last_open_failure() {
        let (controller, keys) = setup();
        let owner = principal(&controller, &keys, "owner");
        let alice = principal(&controller, &keys, "alice");
        let bob = principal(&controller, &keys, "bob");
        controller
            .write("doc", b"data", &owner, &[alice, bob])
            .await
            .unwrap();

        keys.remove("owner");
        keys.generate("owner", controller.engine().entropy()).unwrap();
        keys.remove("alice");
        let err = controller.revoke("doc", "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unwrap);
    }

    #[tokio::test]
    async fn test_update_by_non_owner_is_denied() {
        let (controller, keys) = setup();
        let owner = principal(&controller, &keys, "owner");
        let bob = principal(&controller, &keys, "bob");
        controller.write("doc", b"data", &owner, &[bob]).await.unwrap();

        let err = controller.update("doc", b"new", "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_rewrite_replaces_keyring() {
        let (controller, keys) = setup();
        let owner = principal(&controller, &keys, "owner");
        let bob = principal(&controller, &keys, "bob");
        let carol = principal(&controller, &keys, "carol");

        controller.write("doc", b"v1", &owner, &[bob]).await.unwrap();
        let (_, keystone) = controller.write("doc", b"v2", &owner, &[carol]).await.unwrap();

        assert_eq!(keystone.version(), 1);
        assert_eq!(
            controller.list_recipients("doc").await.unwrap(),
            vec!["carol", "owner"]
        );
    }
}
