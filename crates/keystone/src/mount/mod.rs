//! # Mount Index
//!
//! A table mapping paths to resolution [`Pointer`]s. Looking up a path
//! picks the mount whose path is the longest prefix of the query:
//!
//! ```text
//! /a     -> X
//! /a/b   -> Y
//!
//! resolve_path("/a/b/c") == Some(Y)
//! resolve_path("/a/x")   == Some(X)
//! resolve_path("/z")     == None
//! ```
//!
//! Prefixes end on a segment boundary, so a mount at `/a` answers `/a` and
//! `/a/b` but not `/ab`. A mount at `/` answers every path.
//!
//! Like the scope index, a [`MountIndex`] is a value: `add_mount` and
//! `remove_mount` return a new index at the next version.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::codec::BlockEncoded;
use crate::resolver::Pointer;
use crate::store::{get_block, put_block, Address, ContentStore, StoreError};

/// Type tag carried by every serialized mount index
pub const MOUNT_INDEX_TYPE: &str = "keystone/mount-index";

#[derive(Debug, thiserror::Error)]
pub enum MountIndexError {
    #[error("invalid mount index: {0}")]
    Validation(String),
    #[error("no mount at {0}")]
    NotMounted(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Normalize a mount or query path
///
/// Ensures a leading slash, collapses repeated slashes and drops a
/// trailing slash. The empty path becomes `/`.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Whether the normalized `mount` path is `path` or one of its ancestors
fn covers(mount: &str, path: &str) -> bool {
    match path.strip_prefix(mount) {
        Some(rest) => mount == "/" || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub path: String,
    pub target: Pointer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountIndex {
    #[serde(rename = "type")]
    kind: String,
    version: u64,
    /// Sorted by path, one entry per path
    mounts: Vec<Mount>,
}

impl BlockEncoded for MountIndex {}

impl Default for MountIndex {
    fn default() -> Self {
        Self {
            kind: MOUNT_INDEX_TYPE.to_string(),
            version: 0,
            mounts: Vec::new(),
        }
    }
}

impl MountIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `target` at `path`, replacing any mount already there
    pub fn add_mount(&self, path: &str, target: Pointer) -> Self {
        let path = normalize_path(path);
        let mut mounts = self.mounts.clone();
        match mounts.binary_search_by(|mount| mount.path.as_str().cmp(path.as_str())) {
            Ok(position) => mounts[position].target = target,
            Err(position) => mounts.insert(position, Mount { path, target }),
        }
        self.next(mounts)
    }

    pub fn remove_mount(&self, path: &str) -> Result<Self, MountIndexError> {
        let path = normalize_path(path);
        let position = self
            .mounts
            .binary_search_by(|mount| mount.path.as_str().cmp(path.as_str()))
            .map_err(|_| MountIndexError::NotMounted(path))?;
        let mut mounts = self.mounts.clone();
        mounts.remove(position);
        Ok(self.next(mounts))
    }

    fn next(&self, mounts: Vec<Mount>) -> Self {
        Self {
            kind: self.kind.clone(),
            version: self.version + 1,
            mounts,
        }
    }

    /// Pointer of the longest mount path prefixing `path`
    pub fn resolve_path(&self, path: &str) -> Option<Pointer> {
        let path = normalize_path(path);
        self.mounts
            .iter()
            .filter(|mount| covers(&mount.path, &path))
            .max_by_key(|mount| mount.path.len())
            .map(|mount| mount.target)
    }

    pub fn get(&self, path: &str) -> Option<&Mount> {
        let path = normalize_path(path);
        self.mounts.iter().find(|mount| mount.path == path)
    }

    /// Mounts in path order
    pub fn mounts(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.iter()
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn validate(&self) -> Result<(), MountIndexError> {
        if self.kind != MOUNT_INDEX_TYPE {
            return Err(MountIndexError::Validation(format!(
                "unexpected type tag {:?}",
                self.kind
            )));
        }
        let mut seen = HashSet::new();
        for mount in &self.mounts {
            if normalize_path(&mount.path) != mount.path {
                return Err(MountIndexError::Validation(format!(
                    "path {:?} is not normalized",
                    mount.path
                )));
            }
            if !seen.insert(mount.path.as_str()) {
                return Err(MountIndexError::Validation(format!(
                    "duplicate mount path {}",
                    mount.path
                )));
            }
        }
        if !self.mounts.windows(2).all(|pair| pair[0].path < pair[1].path) {
            return Err(MountIndexError::Validation(
                "mounts are not sorted by path".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate and store the index, returning its content address
    pub async fn publish<S: ContentStore>(&self, store: &S) -> Result<Address, MountIndexError> {
        self.validate()?;
        let address = put_block(store, self).await?;
        tracing::info!(
            "published mount index version {} with {} mounts at {}",
            self.version,
            self.mounts.len(),
            address
        );
        Ok(address)
    }

    pub async fn load<S: ContentStore>(
        address: &Address,
        store: &S,
    ) -> Result<Self, MountIndexError> {
        let index: MountIndex = get_block(store, address).await?;
        index.validate()?;
        Ok(index)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{OsEntropy, SecretKey};
    use crate::store::MemoryContentStore;

    fn pointer() -> Pointer {
        Pointer::from(SecretKey::generate(&OsEntropy).unwrap().public())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("a/b"), "/a/b");
        assert_eq!(normalize_path("/a//b/"), "/a/b");
        assert_eq!(normalize_path("//a///"), "/a");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (x, y) = (pointer(), pointer());
        let index = MountIndex::new().add_mount("/a", x).add_mount("/a/b", y);

        assert_eq!(index.resolve_path("/a/b/c"), Some(y));
        assert_eq!(index.resolve_path("/a/b"), Some(y));
        assert_eq!(index.resolve_path("/a/x"), Some(x));
        assert_eq!(index.resolve_path("a/x"), Some(x));
        assert_eq!(index.resolve_path("/z"), None);
    }

    #[test]
    fn test_prefix_stops_at_segment_boundary() {
        let (x, root) = (pointer(), pointer());
        let index = MountIndex::new().add_mount("/a", x);

        assert_eq!(index.resolve_path("/a"), Some(x));
        assert_eq!(index.resolve_path("/a/"), Some(x));
        assert_eq!(index.resolve_path("/ab"), None);
        assert_eq!(index.resolve_path("/ab/c"), None);

        let index = index.add_mount("/", root);
        assert_eq!(index.resolve_path("/ab"), Some(root));
        assert_eq!(index.resolve_path("/a/b"), Some(x));
    }

    #[test]
    fn test_root_mount_catches_everything() {
        let root = pointer();
        let index = MountIndex::new().add_mount("/", root);
        assert_eq!(index.resolve_path("/anything/at/all"), Some(root));
    }

    #[test]
    fn test_add_replaces_same_path() {
        let (x, y) = (pointer(), pointer());
        let index = MountIndex::new().add_mount("/a", x);
        let replaced = index.add_mount("/a/", y);

        assert_eq!(index.resolve_path("/a"), Some(x));
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced.version(), 2);
        assert_eq!(replaced.resolve_path("/a"), Some(y));
        assert!(replaced.validate().is_ok());
    }

    #[test]
    fn test_remove_mount() {
        let (x, y) = (pointer(), pointer());
        let index = MountIndex::new().add_mount("/a", x).add_mount("/a/b", y);
        let removed = index.remove_mount("/a/b").unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(removed.resolve_path("/a/b/c"), Some(x));
        assert!(matches!(
            removed.remove_mount("/a/b"),
            Err(MountIndexError::NotMounted(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unnormalized() {
        let mut index = MountIndex::new().add_mount("/a", pointer());
        index.mounts.push(Mount {
            path: "/b/".to_string(),
            target: pointer(),
        });
        assert!(matches!(
            index.validate(),
            Err(MountIndexError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_and_load() {
        let store = MemoryContentStore::new();
        let index = MountIndex::new()
            .add_mount("/docs", pointer())
            .add_mount("/", pointer());

        let address = index.publish(&store).await.unwrap();
        let loaded = MountIndex::load(&address, &store).await.unwrap();
        assert_eq!(loaded, index);
        let paths: Vec<&str> = loaded.mounts().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/docs"]);
    }
}
