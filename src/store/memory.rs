//! In-memory object store

use bytes::Bytes;
use gix_hash::ObjectId;
use rustc_hash::FxHashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{Error, Result};
use crate::model::{hash_object, Object, ObjectKind, ObjectReader, Reference};

use super::{BuiltPack, CursorStats, LooseStore, PackRef, PackStore, RefStore, VecCursor};

/// Content reader that keeps a count of live readers
struct TrackedReader {
    inner: std::io::Cursor<Bytes>,
    open: Arc<AtomicUsize>,
}

impl TrackedReader {
    fn boxed(data: Bytes, open: &Arc<AtomicUsize>) -> ObjectReader {
        open.fetch_add(1, Ordering::Relaxed);
        Box::new(Self {
            inner: std::io::Cursor::new(data),
            open: open.clone(),
        })
    }
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::Relaxed);
    }
}

struct StoredPack {
    pack: PackRef,
    index: Bytes,
    data: Bytes,
}

/// An object store held entirely in memory.
///
/// Every cursor and reader it hands out is counted, so callers can check
/// that sequences were closed and readers released.
#[derive(Default)]
pub struct MemoryStore {
    loose: Mutex<FxHashMap<ObjectId, (ObjectKind, Bytes)>>,
    refs: Mutex<Vec<Reference>>,
    packs: Mutex<Vec<StoredPack>>,
    ref_stats: Arc<CursorStats>,
    pack_stats: Arc<CursorStats>,
    open_readers: Arc<AtomicUsize>,
    index_fetches: AtomicUsize,
    packfile_fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a loose object and return its id
    pub fn add_object(&self, kind: ObjectKind, data: impl Into<Bytes>) -> ObjectId {
        let data = data.into();
        let id = hash_object(kind, &data);
        self.insert_object(id, kind, data);
        id
    }

    /// Store a loose object under an id of the caller's choosing
    pub fn insert_object(&self, id: ObjectId, kind: ObjectKind, data: Bytes) {
        let mut loose = self.loose.lock().unwrap_or_else(PoisonError::into_inner);
        loose.insert(id, (kind, data));
    }

    /// Point `name` at `id`, replacing any previous target
    pub fn set_ref(&self, name: &str, id: ObjectId) {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        match refs.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.id = id,
            None => refs.push(Reference::new(name, id)),
        }
    }

    /// Register a pack written by [`PackBuilder`](super::PackBuilder)
    pub fn add_pack(&self, pack: &BuiltPack) -> PackRef {
        let pack_ref = PackRef {
            idx_id: pack.idx_id(),
            pack_id: pack.pack_id(),
        };
        self.insert_pack(pack_ref.clone(), pack.index.clone(), pack.pack.clone());
        pack_ref
    }

    /// Register raw pack and index bytes
    pub fn insert_pack(&self, pack: PackRef, index: Bytes, data: Bytes) {
        let mut packs = self.packs.lock().unwrap_or_else(PoisonError::into_inner);
        packs.push(StoredPack { pack, index, data });
    }

    /// Usage of the cursors returned by `refs`
    pub fn ref_stats(&self) -> &CursorStats {
        &self.ref_stats
    }

    /// Usage of the cursors returned by `packs`
    pub fn pack_stats(&self) -> &CursorStats {
        &self.pack_stats
    }

    /// Readers handed out and not yet dropped
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::Relaxed)
    }

    /// Calls to `pack_index`
    pub fn index_fetches(&self) -> usize {
        self.index_fetches.load(Ordering::Relaxed)
    }

    /// Calls to `packfile`
    pub fn packfile_fetches(&self) -> usize {
        self.packfile_fetches.load(Ordering::Relaxed)
    }
}

impl LooseStore for MemoryStore {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<Object>> {
        let loose = self.loose.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(loose.get(id).map(|(kind, data)| {
            Object::new(
                *kind,
                data.len() as u64,
                TrackedReader::boxed(data.clone(), &self.open_readers),
            )
        }))
    }

    async fn has_object(&self, id: &ObjectId) -> Result<bool> {
        let loose = self.loose.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(loose.contains_key(id))
    }
}

impl RefStore for MemoryStore {
    type Refs = VecCursor<Reference>;

    async fn refs(&self) -> Result<Self::Refs> {
        let refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Ok(VecCursor::tracked(refs, self.ref_stats.clone()))
    }
}

impl PackStore for MemoryStore {
    type Packs = VecCursor<PackRef>;

    async fn packs(&self) -> Result<Self::Packs> {
        let packs = self.packs.lock().unwrap_or_else(PoisonError::into_inner);
        let listed = packs.iter().map(|p| p.pack.clone()).collect();
        Ok(VecCursor::tracked(listed, self.pack_stats.clone()))
    }

    async fn pack_index(&self, idx_id: &str) -> Result<Bytes> {
        self.index_fetches.fetch_add(1, Ordering::Relaxed);
        let packs = self.packs.lock().unwrap_or_else(PoisonError::into_inner);
        packs
            .iter()
            .find(|p| p.pack.idx_id == idx_id)
            .map(|p| p.index.clone())
            .ok_or_else(|| Error::NotFound(format!("pack index {} not found", idx_id)))
    }

    async fn packfile(&self, pack_id: &str) -> Result<ObjectReader> {
        self.packfile_fetches.fetch_add(1, Ordering::Relaxed);
        let packs = self.packs.lock().unwrap_or_else(PoisonError::into_inner);
        packs
            .iter()
            .find(|p| p.pack.pack_id == pack_id)
            .map(|p| TrackedReader::boxed(p.data.clone(), &self.open_readers))
            .ok_or_else(|| Error::NotFound(format!("packfile {} not found", pack_id)))
    }
}
