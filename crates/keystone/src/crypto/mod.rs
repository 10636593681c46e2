//! Cryptographic primitives for keystones
//!
//! This module provides the envelope encryption engine:
//!
//! - **Identity**: Ed25519 keypairs (`SecretKey`/`PublicKey`) for principals and pointers
//! - **Payload Encryption**: ChaCha20-Poly1305 under a per-version [`DataKey`]
//! - **Key Wrapping**: ECDH-based wrapping of a data key for each principal
//!
//! # Security Model
//!
//! ## Data Keys
//! A payload is encrypted exactly once under a freshly generated `DataKey`.
//! The key never leaves memory unwrapped.
//!
//! ## Wrapping Protocol
//! To grant a principal access:
//! 1. Generate ephemeral Ed25519 keypair
//! 2. Convert both keys to X25519 (Montgomery curve)
//! 3. Perform ECDH to derive shared secret
//! 4. Use AES-KW (key wrap) to encrypt the data key with the shared secret
//! 5. Package as a [`WrappedKey`] (ephemeral_pubkey || wrapped_key)
//!
//! ## Randomness
//! All randomness comes from an injected [`EntropySource`].

mod data_key;
mod engine;
mod entropy;
mod keys;
mod keystore;
mod wrapped_key;

pub use data_key::{DataKey, DataKeyError, DATA_KEY_SIZE, NONCE_SIZE};
pub use ed25519_dalek::Signature;
pub use engine::EnvelopeEngine;
pub use entropy::{os_entropy, Entropy, EntropyError, EntropySource, OsEntropy, SeededEntropy};
pub use keys::{KeyError, KeyPair, PublicKey, PublicKeyExport, SecretKey};
pub use keystore::KeyStore;
pub use wrapped_key::{WrapAlgorithm, WrapError, WrappedKey, WRAPPED_KEY_SIZE};
