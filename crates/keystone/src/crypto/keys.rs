use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::entropy::{EntropyError, EntropySource};

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error(transparent)]
    Entropy(#[from] EntropyError),
}

/// Public key for principal identity, key wrapping and pointer ownership
///
/// The public half of an Ed25519 keypair. It serves several purposes:
/// - **Identity**: recorded next to a principal's name in a keyring
/// - **Key Wrapping**: converted to X25519 to wrap a [`DataKey`](super::DataKey)
/// - **Pointers**: a name-resolution pointer is the public key controlling it
///
/// Serializes as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state)
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        PublicKey::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<[u8; PUBLIC_KEY_SIZE]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Result<Self, Self::Error> {
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| anyhow::anyhow!("public key is not a valid edwards point"))?;
        Ok(PublicKey(key))
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut buff = [0; PUBLIC_KEY_SIZE];
        buff.copy_from_slice(bytes);
        buff.try_into()
    }
}

impl PublicKey {
    /// Parse a public key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("public key hex decode error"))?;
        buff.try_into()
    }

    /// Convert public key to raw bytes
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Convert public key to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Describe this key for out-of-band exchange
    pub fn export(&self) -> PublicKeyExport {
        PublicKeyExport {
            kty: PublicKeyExport::KEY_TYPE.to_string(),
            crv: PublicKeyExport::CURVE.to_string(),
            x: URL_SAFE_NO_PAD.encode(self.to_bytes()),
        }
    }

    /// Rebuild a public key from its exported description
    pub fn from_export(export: &PublicKeyExport) -> Result<Self, KeyError> {
        if export.kty != PublicKeyExport::KEY_TYPE || export.crv != PublicKeyExport::CURVE {
            return Err(anyhow::anyhow!(
                "unsupported key description: kty={}, crv={}",
                export.kty,
                export.crv
            )
            .into());
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(&export.x)
            .map_err(|e| anyhow::anyhow!("invalid key material: {}", e))?;
        PublicKey::try_from(bytes.as_slice())
    }

    /// Convert Ed25519 public key to X25519 (Montgomery curve) for ECDH
    ///
    /// # Errors
    ///
    /// Returns an error if the Ed25519 point cannot be converted (invalid point).
    #[allow(clippy::wrong_self_convention)]
    pub(crate) fn to_x25519(&self) -> Result<X25519PublicKey, KeyError> {
        let edwards_bytes = self.to_bytes();
        let edwards_point = CompressedEdwardsY::from_slice(&edwards_bytes)
            .map_err(|_| anyhow::anyhow!("public key invalid edwards point"))?
            .decompress()
            .ok_or_else(|| anyhow::anyhow!("public key failed to decompress edwards point"))?;

        let montgomery_point = edwards_point.to_montgomery();
        Ok(X25519PublicKey::from(montgomery_point.to_bytes()))
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &ed25519_dalek::Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        self.0.verify_strict(msg, signature)
    }
}

/// An interoperable description of a public key, in the shape of an
/// OKP JSON Web Key (`kty`, `crv`, base64url `x`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyExport {
    pub kty: String,
    pub crv: String,
    pub x: String,
}

impl PublicKeyExport {
    pub const KEY_TYPE: &'static str = "OKP";
    pub const CURVE: &'static str = "Ed25519";
}

/// Secret key for principal identity, key unwrapping and pointer publishing
///
/// The private part of an Ed25519 keypair. Keep it out of any persisted
/// record; callers hold it in a [`KeyStore`](super::KeyStore) or load it
/// from PEM.
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey({})", self.public().to_hex())
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&secret))
    }
}

impl SecretKey {
    /// Parse a secret key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PRIVATE_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("private key hex decode error"))?;
        Ok(Self::from(buff))
    }

    /// Generate a new random secret key from the given entropy source
    pub fn generate(entropy: &dyn EntropySource) -> Result<Self, KeyError> {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        entropy.fill(&mut bytes)?;
        Ok(Self::from(bytes))
    }

    /// Derive the public key from this secret key
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Convert secret key to raw bytes
    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Convert secret key to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Encode secret key in PEM format for secure storage
    ///
    /// Returns a PEM-encoded string with tag "PRIVATE KEY".
    pub fn to_pem(&self) -> String {
        let pem = pem::Pem::new("PRIVATE KEY", self.to_bytes());
        pem::encode(&pem)
    }

    /// Parse a secret key from PEM format
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The PEM string is malformed
    /// - The PEM tag is not "PRIVATE KEY"
    /// - The key size is incorrect
    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| anyhow::anyhow!("failed to parse PEM: {}", e))?;

        if pem.tag() != "PRIVATE KEY" {
            return Err(anyhow::anyhow!("invalid PEM tag, expected PRIVATE KEY").into());
        }

        let contents = pem.contents();
        if contents.len() != PRIVATE_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid private key size in PEM, expected {}, got {}",
                PRIVATE_KEY_SIZE,
                contents.len()
            )
            .into());
        }

        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        bytes.copy_from_slice(contents);
        Ok(Self::from(bytes))
    }

    /// Convert Ed25519 secret key to X25519 (Montgomery curve) for ECDH
    ///
    /// The clamped scalar of the Ed25519 key is used as the X25519 private key,
    /// which pairs with [`PublicKey::to_x25519`].
    pub(crate) fn to_x25519(&self) -> StaticSecret {
        StaticSecret::from(self.0.to_scalar_bytes())
    }

    /// Sign a message with this secret key using Ed25519.
    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}

/// A freshly generated keypair together with the exportable public half
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
    pub export: PublicKeyExport,
}

impl KeyPair {
    pub fn generate(entropy: &dyn EntropySource) -> Result<Self, KeyError> {
        let secret_key = SecretKey::generate(entropy)?;
        let public_key = secret_key.public();
        let export = public_key.export();
        Ok(Self {
            secret_key,
            public_key,
            export,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::entropy::OsEntropy;

    #[test]
    fn test_keypair_generation() {
        let private_key = SecretKey::generate(&OsEntropy).unwrap();
        let public_key = private_key.public();

        let private_hex = private_key.to_hex();
        let recovered_private = SecretKey::from_hex(&private_hex).unwrap();
        assert_eq!(private_key.to_bytes(), recovered_private.to_bytes());

        let public_hex = public_key.to_hex();
        let recovered_public = PublicKey::from_hex(&public_hex).unwrap();
        assert_eq!(public_key, recovered_public);
    }

    #[test]
    fn test_pem_serialization() {
        let private_key = SecretKey::generate(&OsEntropy).unwrap();

        let pem = private_key.to_pem();
        let recovered_private = SecretKey::from_pem(&pem).unwrap();
        assert_eq!(private_key.to_bytes(), recovered_private.to_bytes());
        assert_eq!(private_key.public(), recovered_private.public());
    }

    #[test]
    fn test_export_roundtrip() {
        let pair = KeyPair::generate(&OsEntropy).unwrap();
        assert_eq!(pair.export.kty, "OKP");
        assert_eq!(pair.export.crv, "Ed25519");

        let json = serde_json::to_string(&pair.export).unwrap();
        let export: PublicKeyExport = serde_json::from_str(&json).unwrap();
        let recovered = PublicKey::from_export(&export).unwrap();
        assert_eq!(recovered, pair.public_key);
    }

    #[test]
    fn test_export_rejects_unknown_curve() {
        let pair = KeyPair::generate(&OsEntropy).unwrap();
        let mut export = pair.export.clone();
        export.crv = "X448".to_string();
        assert!(PublicKey::from_export(&export).is_err());
    }

    #[test]
    fn test_public_key_serde_as_hex() {
        let public_key = SecretKey::generate(&OsEntropy).unwrap().public();
        let json = serde_json::to_string(&public_key).unwrap();
        assert_eq!(json, format!("\"{}\"", public_key.to_hex()));
        let recovered: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, public_key);
    }

    #[test]
    fn test_sign_and_verify() {
        let secret_key = SecretKey::generate(&OsEntropy).unwrap();
        let public_key = secret_key.public();
        let message = b"hello, world!";

        let signature = secret_key.sign(message);
        assert!(public_key.verify(message, &signature).is_ok());
        assert!(public_key.verify(b"hello, world?", &signature).is_err());

        let other_key = SecretKey::generate(&OsEntropy).unwrap().public();
        assert!(other_key.verify(message, &signature).is_err());
    }
}
