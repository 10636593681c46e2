//! Key wrapping using ECDH + AES Key Wrap
//!
//! A [`DataKey`] is wrapped independently for every principal with access.
//! Each wrap uses its own ephemeral keypair, so one principal's wrapped key
//! reveals nothing that helps unwrap another's.
//!
//! To wrap a data key for a principal:
//! 1. **Generate ephemeral keypair**: Create a temporary Ed25519 keypair
//! 2. **Perform ECDH**: Convert keys to X25519 and compute a shared secret
//! 3. **Wrap key**: Use AES-KW to encrypt the data key with the shared secret
//! 4. **Package**: ephemeral public key || wrapped key, tagged with the algorithm
//!
//! The recipient reverses this with their private key. AES-KW carries an
//! integrity check, so a wrong key and a corrupted envelope both surface as
//! the same opaque [`WrapError::Unwrap`].

use std::convert::TryFrom;
use std::fmt;

use aes_kw::KekAes256 as Kek;
use serde::{Deserialize, Serialize};

use super::data_key::{DataKey, DATA_KEY_SIZE};
use super::entropy::EntropySource;
use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};

/// Size of AES Key Wrap integrity block in bytes
pub const KW_NONCE_SIZE: usize = 8;
/// Total size of a wrapped key body in bytes
///
/// Layout: ephemeral_pubkey (32) || wrapped_key (40) = 72 bytes
pub const WRAPPED_KEY_SIZE: usize = PUBLIC_KEY_SIZE + DATA_KEY_SIZE + KW_NONCE_SIZE;

/// Errors that can occur while wrapping or unwrapping a data key
#[derive(Debug, thiserror::Error)]
pub enum WrapError {
    #[error("wrap error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    /// Wrong recipient key or malformed envelope; the two are not told apart.
    #[error("unable to unwrap data key")]
    Unwrap,
}

/// The algorithm a [`WrappedKey`] was produced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapAlgorithm {
    /// Ephemeral X25519 ECDH (Ed25519 keys mapped to Montgomery form)
    /// feeding a 256-bit AES Key Wrap (RFC 3394)
    #[serde(rename = "x25519-aes-kw")]
    X25519AesKw,
}

impl fmt::Display for WrapAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrapAlgorithm::X25519AesKw => write!(f, "x25519-aes-kw"),
        }
    }
}

/// A data key wrapped for exactly one principal
///
/// # Wire Format
///
/// ```text
/// { alg: "x25519-aes-kw", body: [ ephemeral_pubkey: 32 bytes ][ wrapped_key: 40 bytes ] }
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WrappedKey {
    alg: WrapAlgorithm,
    body: WrappedBody,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct WrappedBody([u8; WRAPPED_KEY_SIZE]);

impl Default for WrappedBody {
    fn default() -> Self {
        WrappedBody([0; WRAPPED_KEY_SIZE])
    }
}

impl Serialize for WrappedBody {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for WrappedBody {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{Error, Visitor};

        struct BodyVisitor;

        impl<'de> Visitor<'de> for BodyVisitor {
            type Value = WrappedBody;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte array or sequence of WRAPPED_KEY_SIZE")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: Error,
            {
                if v.len() != WRAPPED_KEY_SIZE {
                    return Err(E::invalid_length(
                        v.len(),
                        &format!("expected {} bytes", WRAPPED_KEY_SIZE).as_str(),
                    ));
                }
                let mut array = [0u8; WRAPPED_KEY_SIZE];
                array.copy_from_slice(v);
                Ok(WrappedBody(array))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(WRAPPED_KEY_SIZE);
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                self.visit_bytes(&bytes)
            }
        }

        // Try bytes first (for CBOR/bincode), fallback to seq (for JSON)
        deserializer.deserialize_byte_buf(BodyVisitor)
    }
}

impl TryFrom<&[u8]> for WrappedKey {
    type Error = WrapError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != WRAPPED_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid wrapped key size, expected {}, got {}",
                WRAPPED_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut body = WrappedBody::default();
        body.0.copy_from_slice(bytes);
        Ok(WrappedKey {
            alg: WrapAlgorithm::X25519AesKw,
            body,
        })
    }
}

impl WrappedKey {
    /// Parse a wrapped key body from a hexadecimal string
    pub fn from_hex(hex: &str) -> Result<Self, WrapError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; WRAPPED_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|_| anyhow::anyhow!("hex decode error"))?;
        WrappedKey::try_from(buff.as_slice())
    }

    /// Convert the wrapped key body to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.body.0)
    }

    /// The algorithm this key was wrapped with
    pub fn algorithm(&self) -> WrapAlgorithm {
        self.alg
    }

    /// Wrap a data key for a specific recipient
    ///
    /// # Errors
    ///
    /// Returns an error if the recipient key cannot be mapped to X25519,
    /// randomness is unavailable, or AES-KW fails.
    pub fn wrap(
        data_key: &DataKey,
        recipient: &PublicKey,
        entropy: &dyn EntropySource,
    ) -> Result<Self, WrapError> {
        let ephemeral_private = SecretKey::generate(entropy)?;
        let ephemeral_public = ephemeral_private.public();

        let ephemeral_x25519_private = ephemeral_private.to_x25519();
        let recipient_x25519_public = recipient.to_x25519()?;

        let shared_secret = ephemeral_x25519_private.diffie_hellman(&recipient_x25519_public);

        let kek = Kek::from(*shared_secret.as_bytes());
        let wrapped = kek
            .wrap_vec(data_key.bytes())
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;

        let ephemeral_bytes = ephemeral_public.to_bytes();

        // sanity check we're getting `WRAPPED_KEY_SIZE` bytes here
        if ephemeral_bytes.len() + wrapped.len() != WRAPPED_KEY_SIZE {
            return Err(anyhow::anyhow!("expected wrapped key size is incorrect").into());
        };

        let mut body = WrappedBody::default();
        body.0[..PUBLIC_KEY_SIZE].copy_from_slice(&ephemeral_bytes);
        body.0[PUBLIC_KEY_SIZE..].copy_from_slice(&wrapped);

        Ok(WrappedKey {
            alg: WrapAlgorithm::X25519AesKw,
            body,
        })
    }

    /// Recover the data key using the recipient's private key
    ///
    /// # Errors
    ///
    /// Returns [`WrapError::Unwrap`] whether the key belongs to someone else
    /// or the envelope was corrupted.
    pub fn unwrap_key(&self, recipient_secret: &SecretKey) -> Result<DataKey, WrapError> {
        match self.alg {
            WrapAlgorithm::X25519AesKw => {}
        }

        let ephemeral_public = PublicKey::try_from(&self.body.0[..PUBLIC_KEY_SIZE])
            .map_err(|_| WrapError::Unwrap)?;

        let recipient_x25519_private = recipient_secret.to_x25519();
        let ephemeral_x25519_public = ephemeral_public.to_x25519().map_err(|_| WrapError::Unwrap)?;

        let shared_secret = recipient_x25519_private.diffie_hellman(&ephemeral_x25519_public);

        let kek = Kek::from(*shared_secret.as_bytes());
        let unwrapped = kek
            .unwrap_vec(&self.body.0[PUBLIC_KEY_SIZE..])
            .map_err(|_| WrapError::Unwrap)?;

        DataKey::from_slice(&unwrapped).map_err(|_| WrapError::Unwrap)
    }

    /// Get a reference to the raw wrapped key body
    pub fn bytes(&self) -> &[u8] {
        &self.body.0
    }
}
