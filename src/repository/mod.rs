//! Read-only repository access
//!
//! [`Repository`] layers git semantics over an [`ObjectStore`]:
//!
//! - **refs**: symbolic name or literal id -> object id
//! - **accessor**: id -> object, loose store first, packs second
//! - **commit**: streaming commit/tag field parser and commit folding
//! - **tree**: tree entry decoding and path walking
//! - **log**: first-parent history walk
//! - **pack**: pack lookup, slicing, decoding and caching

mod commit;
mod log;
mod memo;
mod pack;
mod refs;
mod tree;

pub use commit::{read_header_field, CommitFields};
pub use log::Log;
pub use memo::Memo;
pub use pack::{parse_idx_v2, write_idx_v2, IndexEntry, PackIndex, PackLocation, UnpackedPack};
pub use tree::{File, TreeEntries};

use bytes::Bytes;
use gix_hash::ObjectId;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::model::{parse_id, CachedObject, Object, ObjectKind};
use crate::store::{LooseStore, ObjectStore, PackDecoder};

/// Read-only view of a git object store
pub struct Repository<S, D> {
    store: S,
    decoder: D,
    config: RepositoryConfig,

    /// Fully decoded packed objects, by id. Entries are never replaced.
    objects: Mutex<FxHashMap<ObjectId, CachedObject>>,
    /// Parsed pack indices, by pack id
    indices: Memo<String, Arc<PackIndex>>,
    /// Whole packfile contents, by pack id
    packfiles: Memo<String, Bytes>,
    /// Every object of a pack, decoded once, by pack id
    unpacked: Memo<String, UnpackedPack>,
}

impl<S: ObjectStore, D: PackDecoder> Repository<S, D> {
    pub fn new(store: S, decoder: D) -> Self {
        Self::with_config(store, decoder, RepositoryConfig::default())
    }

    pub fn with_config(store: S, decoder: D, config: RepositoryConfig) -> Self {
        Self {
            store,
            decoder,
            config,
            objects: Mutex::new(FxHashMap::default()),
            indices: Memo::new(),
            packfiles: Memo::new(),
            unpacked: Memo::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Fetch an object from loose storage, falling back to packs only when
    /// the loose store reports it absent
    pub async fn get_object_from_any(&self, id: &ObjectId) -> Result<Object> {
        if let Some(object) = self.store.get_object(id).await? {
            return Ok(object);
        }
        trace!(%id, "not loose, trying packs");
        self.get_object_from_pack(id).await
    }

    /// Whether the object exists in loose storage or any pack
    pub async fn has_object_from_any(&self, id: &ObjectId) -> Result<bool> {
        if self.store.has_object(id).await? {
            return Ok(true);
        }
        self.has_object_from_pack(id).await
    }

    /// Resolve `rev` and peel it down to a tree
    pub async fn get_tree(&self, rev: &str) -> Result<(Object, ObjectId)> {
        let id = self.resolve_ref(rev).await?;
        self.peel(id, ObjectKind::Tree).await
    }

    /// Resolve `rev` and peel it down to a commit
    pub async fn get_commit(&self, rev: &str) -> Result<(Object, ObjectId)> {
        let id = self.resolve_ref(rev).await?;
        self.peel(id, ObjectKind::Commit).await
    }

    /// Follow tags (and, for trees, commits) until an object of `target` kind
    /// is reached
    pub(crate) async fn peel(&self, mut id: ObjectId, target: ObjectKind) -> Result<(Object, ObjectId)> {
        loop {
            let object = self.get_object_from_any(&id).await?;
            let kind = object.kind;
            let field = match (kind, target) {
                _ if kind == target => return Ok((object, id)),
                (ObjectKind::Tag, _) => "object",
                (ObjectKind::Commit, ObjectKind::Tree) => "tree",
                (actual, expected) => return Err(Error::UnexpectedType { expected, actual }),
            };

            let next = read_header_field(object, field).await?.ok_or_else(|| {
                Error::MalformedObject(format!("{} {} has no {} field", kind, id, field))
            })?;
            trace!(from = %id, to = %next, via = field, "peeling");
            id = parse_id(&next)?;
        }
    }

    /// A decoded pack object, if it has been decoded before
    pub(crate) fn cached_object(&self, id: &ObjectId) -> Option<CachedObject> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        objects.get(id).cloned()
    }

    /// Add a decoded object to the cache; an existing entry wins
    pub(crate) fn cache_object(&self, object: CachedObject) -> CachedObject {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        objects.entry(object.id).or_insert(object).clone()
    }

    /// Number of objects in the decoded-object cache
    pub fn cached_objects(&self) -> usize {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
