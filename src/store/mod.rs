//! Collaborator traits for the object store
//!
//! The repository core only talks to storage through these traits, so the
//! traversal logic can run against a real `.git` directory ([`FsStore`]),
//! an in-memory store ([`MemoryStore`]), or anything else that can list refs
//! and hand out object bytes.
//!
//! - **Cursor**: a lazy, forward-only sequence that can be stopped early
//! - **LooseStore**: objects addressable one by one
//! - **RefStore**: name -> id enumeration
//! - **PackStore**: pack listing, raw index bytes and raw packfile bytes
//! - **PackDecoder**: index parsing and pack entry decoding ([`GitDecoder`])

mod delta;
mod fs;
mod memory;
mod packfile;

pub use delta::apply_delta;
pub use fs::FsStore;
pub use memory::MemoryStore;
pub use packfile::{BuiltPack, GitDecoder, PackBuilder};

use bytes::Bytes;
use gix_hash::ObjectId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Object, ObjectReader, Reference};

/// A lazy, forward-only sequence.
///
/// `close` stops the sequence early and releases whatever backs it. It is
/// idempotent and may be called after the sequence has been exhausted.
#[allow(async_fn_in_trait)]
pub trait Cursor {
    type Item;

    /// The next item, or `None` once the sequence has ended
    async fn next(&mut self) -> Result<Option<Self::Item>>;

    /// Stop reading and release the underlying resources
    async fn close(&mut self) -> Result<()>;

    /// Drain the remaining items
    async fn collect(&mut self) -> Result<Vec<Self::Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

/// Counters describing how a store's cursors were used
#[derive(Debug, Default)]
pub struct CursorStats {
    opened: AtomicUsize,
    consumed: AtomicUsize,
    closed: AtomicUsize,
}

impl CursorStats {
    /// Cursors handed out
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Items read across all cursors
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Cursors stopped early through `close`
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Relaxed)
    }
}

/// A cursor over items that are already in memory
pub struct VecCursor<T> {
    items: std::vec::IntoIter<T>,
    done: bool,
    stats: Option<Arc<CursorStats>>,
}

impl<T> VecCursor<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter(),
            done: false,
            stats: None,
        }
    }

    /// Record opens, reads and early closes into `stats`
    pub fn tracked(items: Vec<T>, stats: Arc<CursorStats>) -> Self {
        stats.opened.fetch_add(1, Ordering::Relaxed);
        Self {
            items: items.into_iter(),
            done: false,
            stats: Some(stats),
        }
    }
}

impl<T> Cursor for VecCursor<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>> {
        if self.done {
            return Ok(None);
        }
        match self.items.next() {
            Some(item) => {
                if let Some(stats) = &self.stats {
                    stats.consumed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Some(item))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.items = Vec::new().into_iter();
        if let Some(stats) = &self.stats {
            stats.closed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// A pack known to the store: its index id and its packfile id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackRef {
    pub idx_id: String,
    pub pack_id: String,
}

/// Objects stored individually
#[allow(async_fn_in_trait)]
pub trait LooseStore {
    /// Fetch an object; `Ok(None)` means "not stored here"
    async fn get_object(&self, id: &ObjectId) -> Result<Option<Object>>;

    async fn has_object(&self, id: &ObjectId) -> Result<bool>;
}

/// Reference enumeration
#[allow(async_fn_in_trait)]
pub trait RefStore {
    type Refs: Cursor<Item = Reference>;

    /// Enumerate every reference, in no particular order
    async fn refs(&self) -> Result<Self::Refs>;
}

/// Pack listing and raw pack bytes
#[allow(async_fn_in_trait)]
pub trait PackStore {
    type Packs: Cursor<Item = PackRef>;

    async fn packs(&self) -> Result<Self::Packs>;

    /// Raw bytes of a pack index
    async fn pack_index(&self, idx_id: &str) -> Result<Bytes>;

    /// Raw bytes of a packfile
    async fn packfile(&self, pack_id: &str) -> Result<ObjectReader>;
}

/// Everything the repository needs from storage
pub trait ObjectStore: LooseStore + RefStore + PackStore {}

impl<T: LooseStore + RefStore + PackStore> ObjectStore for T {}

/// One packed entry: the bytes from its offset up to the next entry
#[derive(Debug, Clone)]
pub struct PackRecord {
    /// Offset of the entry inside its packfile
    pub offset: u64,
    pub data: Bytes,
}

/// Resolves delta bases while a pack entry is decoded
#[allow(async_fn_in_trait)]
pub trait BaseResolver {
    /// The base named by id, wherever it is stored
    async fn base_object(&self, id: &ObjectId) -> Result<Object>;

    /// The base whose entry starts at `offset` in the pack being decoded
    async fn base_at_offset(&self, offset: u64) -> Result<Object>;
}

/// Pack index parsing and pack entry decoding.
///
/// `max_size` is the ceiling on any declared object or delta size. Decoders
/// check it before allocating and fail with `ObjectTooLarge` above it.
#[allow(async_fn_in_trait)]
pub trait PackDecoder {
    /// Parse raw index bytes into `(id, offset)` pairs.
    ///
    /// The default understands git's version 2 `.idx` format.
    fn parse_index(&self, data: &[u8]) -> Result<Vec<(ObjectId, u64)>> {
        crate::repository::parse_idx_v2(data)
    }

    /// Decode the single object whose entry starts at the beginning of `record`
    async fn decode_object<B: BaseResolver>(
        &self,
        record: PackRecord,
        bases: &B,
        max_size: u64,
    ) -> Result<Object>;

    /// Decode every object in a whole packfile, in pack order
    async fn decode_pack<B: BaseResolver>(
        &self,
        pack: Bytes,
        bases: &B,
        max_size: u64,
    ) -> Result<Vec<Object>>;
}
