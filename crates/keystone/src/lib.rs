/**
 * Envelope encryption primitives.
 *  - Data keys, payload sealing and key wrapping
 *  - Ed25519 identities and an injectable entropy source
 */
pub mod crypto;
/**
 * DAG-CBOR block encoding shared by every
 *  persisted record.
 */
pub mod codec;
/**
 * Runtime configuration, loaded from TOML.
 */
pub mod config;
/**
 * Content-addressed storage and the mutable
 *  id -> latest address index.
 * Ships in-memory and iroh-blobs backends.
 */
pub mod store;
/**
 * Signed, mutable pointers to content addresses.
 */
pub mod resolver;
/**
 * Keystones, their keyrings, the repository
 *  that versions them and the access controller
 *  that grants, revokes and rotates.
 */
pub mod keystone;
/**
 * The scope index: an owner's versioned registry
 *  of authorized producers.
 */
pub mod registry;
/**
 * Independent producers publishing keystones
 *  under their own pointer.
 */
pub mod node;
/**
 * Scatter-gather of producer keystones into one
 *  merged, re-encrypted aggregation.
 */
pub mod aggregate;
/**
 * Path to pointer table resolved by longest prefix.
 */
pub mod mount;

pub mod prelude {
    pub use crate::aggregate::{AggregateError, AggregationKeystone, AggregationOutcome, Aggregator};
    pub use crate::config::{AggregatorConfig, KeystoneConfig};
    pub use crate::crypto::{EnvelopeEngine, KeyStore, PublicKey, SecretKey};
    pub use crate::keystone::{
        AccessController, AccessError, ErrorKind, Keystone, KeystoneRepository, Principal,
    };
    pub use crate::mount::MountIndex;
    pub use crate::node::{PublishOutcome, WriteNode};
    pub use crate::registry::{MergePolicy, ScopeIndex, ServiceDefinition};
    pub use crate::resolver::{NameResolver, Pointer};
    pub use crate::store::{Address, ContentStore, KeystoneIndex};
}
