use super::data_key::{DataKey, DataKeyError};
use super::entropy::{os_entropy, Entropy, EntropySource};
use super::keys::{KeyError, KeyPair, PublicKey, SecretKey};
use super::wrapped_key::{WrapError, WrappedKey};

/// The envelope encryption engine
///
/// Bundles the primitive operations (data key generation, payload sealing,
/// key wrapping) around one injected [`EntropySource`]. Cloning is cheap;
/// clones share the entropy source.
#[derive(Debug, Clone)]
pub struct EnvelopeEngine {
    entropy: Entropy,
}

impl Default for EnvelopeEngine {
    fn default() -> Self {
        Self::new(os_entropy())
    }
}

impl EnvelopeEngine {
    pub fn new(entropy: Entropy) -> Self {
        Self { entropy }
    }

    pub fn entropy(&self) -> &dyn EntropySource {
        self.entropy.as_ref()
    }

    pub fn generate_data_key(&self) -> Result<DataKey, DataKeyError> {
        DataKey::generate(self.entropy())
    }

    /// Seal `plaintext` under `data_key`; the nonce is prepended to the output
    pub fn encrypt_payload(
        &self,
        data_key: &DataKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, DataKeyError> {
        data_key.encrypt(plaintext, self.entropy())
    }

    pub fn decrypt_payload(
        &self,
        data_key: &DataKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DataKeyError> {
        data_key.decrypt(ciphertext)
    }

    pub fn wrap_key(
        &self,
        data_key: &DataKey,
        recipient: &PublicKey,
    ) -> Result<WrappedKey, WrapError> {
        WrappedKey::wrap(data_key, recipient, self.entropy())
    }

    pub fn unwrap_key(
        &self,
        wrapped: &WrappedKey,
        recipient_secret: &SecretKey,
    ) -> Result<DataKey, WrapError> {
        wrapped.unwrap_key(recipient_secret)
    }

    pub fn generate_key_pair(&self) -> Result<KeyPair, KeyError> {
        KeyPair::generate(self.entropy())
    }
}
