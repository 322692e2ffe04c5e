//! Packed object lookup and caching
//!
//! Lookup runs in stages, each memoized per pack id:
//!
//! 1. **index**: raw index bytes parsed once into a [`PackIndex`]
//! 2. **packfile**: the whole packfile read once into memory
//! 3. **slice**: the record's byte range `[offset, next offset or end)`
//! 4. **decode**: the record handed to the [`PackDecoder`]
//!
//! Decoded objects land in the repository-wide object cache, so the second
//! lookup of an id never reaches the decoder. Delta bases are resolved
//! through `PackBases`, which bounds how deep a chain may go.

mod index;

pub use index::{parse_idx_v2, write_idx_v2, IndexEntry, PackIndex};

use bytes::Bytes;
use gix_hash::ObjectId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::model::{CachedObject, Object, ObjectKind};
use crate::store::{
    BaseResolver, Cursor, LooseStore, ObjectStore, PackDecoder, PackRecord, PackRef, PackStore,
    VecCursor,
};
use crate::util::format_size;

use super::Repository;

/// Where a packed object lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackLocation {
    pub pack_id: String,
    pub offset: u64,
    /// Offset of the following object; `None` means end of pack
    pub end: Option<u64>,
}

/// Every object of one pack, decoded. Cheap to clone and replayable.
#[derive(Debug, Clone)]
pub struct UnpackedPack {
    objects: Arc<[CachedObject]>,
}

impl UnpackedPack {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedObject> {
        self.objects.iter()
    }

    /// A fresh cursor over the decoded objects, from the start
    pub fn cursor(&self) -> VecCursor<Object> {
        VecCursor::new(self.objects.iter().map(CachedObject::to_object).collect())
    }
}

type BoxedFetch<'a> = Pin<Box<dyn Future<Output = Result<Object>> + 'a>>;

/// Delta base lookups on behalf of one pack entry
struct PackBases<'r, S, D> {
    repo: &'r Repository<S, D>,
    pack_id: &'r str,
    index: &'r Arc<PackIndex>,
    /// Number of deltas between the requested object and this entry
    depth: usize,
}

impl<S: ObjectStore, D: PackDecoder> PackBases<'_, S, D> {
    fn check_depth(&self) -> Result<()> {
        let limit = self.repo.config.max_delta_depth;
        if self.depth > limit {
            return Err(Error::MalformedObject(format!(
                "delta chain in pack {} is deeper than {}",
                self.pack_id, limit
            )));
        }
        Ok(())
    }
}

impl<S: ObjectStore, D: PackDecoder> BaseResolver for PackBases<'_, S, D> {
    async fn base_object(&self, id: &ObjectId) -> Result<Object> {
        self.check_depth()?;
        if let Some(object) = self.repo.store.get_object(id).await? {
            return Ok(object);
        }
        // Boxed: resolving a base re-enters the pack pipeline
        let fetch: BoxedFetch<'_> = Box::pin(self.repo.object_from_pack(id, self.depth));
        fetch.await
    }

    async fn base_at_offset(&self, offset: u64) -> Result<Object> {
        self.check_depth()?;
        let (id, entry) = self.index.at_offset(offset).ok_or_else(|| {
            Error::MalformedObject(format!(
                "no entry starts at offset {} of pack {}",
                offset, self.pack_id
            ))
        })?;
        let location = PackLocation {
            pack_id: self.pack_id.to_string(),
            offset,
            end: entry.end,
        };
        let fetch: BoxedFetch<'_> =
            Box::pin(self.repo.object_at(&id, &location, self.index, self.depth));
        fetch.await
    }
}

impl<S: ObjectStore, D: PackDecoder> Repository<S, D> {
    /// Find the first pack whose index contains `id`
    pub async fn find_packed_object(&self, id: &ObjectId) -> Result<PackLocation> {
        self.locate(id).await.map(|(location, _)| location)
    }

    async fn locate(&self, id: &ObjectId) -> Result<(PackLocation, Arc<PackIndex>)> {
        let mut packs = self.store.packs().await?;
        let found = self.scan_packs(&mut packs, id).await;

        match found {
            Ok(Some((location, index))) => {
                packs.close().await?;
                trace!(%id, pack = %location.pack_id, offset = location.offset, "found packed object");
                Ok((location, index))
            }
            Ok(None) => Err(Error::NotFound(format!("object {} not found", id))),
            Err(err) => {
                let _ = packs.close().await;
                Err(err)
            }
        }
    }

    async fn scan_packs(
        &self,
        packs: &mut S::Packs,
        id: &ObjectId,
    ) -> Result<Option<(PackLocation, Arc<PackIndex>)>> {
        while let Some(pack) = packs.next().await? {
            let index = self.pack_index_cached(&pack).await?;
            if let Some(entry) = index.find(id) {
                let location = PackLocation {
                    pack_id: pack.pack_id,
                    offset: entry.offset,
                    end: entry.end,
                };
                return Ok(Some((location, index)));
            }
        }
        Ok(None)
    }

    /// The listing entry for `pack_id`; the listing is closed once it is found
    async fn pack_ref(&self, pack_id: &str) -> Result<PackRef> {
        let mut packs = self.store.packs().await?;
        let found = loop {
            match packs.next().await {
                Ok(Some(pack)) if pack.pack_id == pack_id => break Ok(Some(pack)),
                Ok(Some(_)) => {}
                Ok(None) => break Ok(None),
                Err(err) => break Err(err),
            }
        };

        match found {
            Ok(found) => {
                packs.close().await?;
                found.ok_or_else(|| Error::NotFound(format!("pack {} not found", pack_id)))
            }
            Err(err) => {
                let _ = packs.close().await;
                Err(err)
            }
        }
    }

    /// The parsed index of `pack`, parsed at most once per pack id
    pub async fn pack_index_cached(&self, pack: &PackRef) -> Result<Arc<PackIndex>> {
        self.indices
            .get_or_fetch(&pack.pack_id, || async {
                let raw = self.store.pack_index(&pack.idx_id).await?;
                let index = PackIndex::new(self.decoder.parse_index(&raw)?);
                debug!(pack = %pack.pack_id, objects = index.len(), "parsed pack index");
                Ok(Arc::new(index))
            })
            .await
    }

    /// The full contents of a packfile, read at most once per pack id
    pub async fn packfile_cached(&self, pack_id: &str) -> Result<Bytes> {
        self.packfiles
            .get_or_fetch(&pack_id.to_string(), || async {
                let mut reader = self.store.packfile(pack_id).await?;
                let mut data = Vec::new();
                reader.read_to_end(&mut data).await?;
                debug!(pack = %pack_id, size = %format_size(data.len() as u64), "loaded packfile");
                Ok(Bytes::from(data))
            })
            .await
    }

    /// Fetch an object from the packs, decoding it at most once
    pub async fn get_object_from_pack(&self, id: &ObjectId) -> Result<Object> {
        self.object_from_pack(id, 0).await
    }

    /// `get_object_from_pack` for an object `depth` deltas below the one
    /// originally requested
    async fn object_from_pack(&self, id: &ObjectId, depth: usize) -> Result<Object> {
        if let Some(cached) = self.cached_object(id) {
            trace!(%id, "decoded-object cache hit");
            return Ok(cached.to_object());
        }
        let (location, index) = self.locate(id).await?;
        self.object_at(id, &location, &index, depth).await
    }

    /// Decode the entry at `location`, which the index says holds `id`
    async fn object_at(
        &self,
        id: &ObjectId,
        location: &PackLocation,
        index: &Arc<PackIndex>,
        depth: usize,
    ) -> Result<Object> {
        if let Some(cached) = self.cached_object(id) {
            return Ok(cached.to_object());
        }
        let pack = self.packfile_cached(&location.pack_id).await?;

        let end = location.end.unwrap_or(pack.len() as u64);
        if location.offset > end || end > pack.len() as u64 {
            return Err(Error::MalformedObject(format!(
                "object {} at {}..{} lies outside pack {} ({} bytes)",
                id,
                location.offset,
                end,
                location.pack_id,
                pack.len()
            )));
        }
        let record = PackRecord {
            offset: location.offset,
            data: pack.slice(location.offset as usize..end as usize),
        };

        let bases = PackBases {
            repo: self,
            pack_id: &location.pack_id,
            index,
            depth: depth + 1,
        };
        let object = self
            .decoder
            .decode_object(record, &bases, self.config.max_object_size)
            .await?;
        let cached = self.materialize(id, object).await?;
        Ok(self.cache_object(cached).to_object())
    }

    /// Whether any pack holds `id`
    pub async fn has_object_from_pack(&self, id: &ObjectId) -> Result<bool> {
        if self.cached_object(id).is_some() {
            return Ok(true);
        }
        match self.find_packed_object(id).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Decode every object in a pack, once per pack id.
    ///
    /// Each decoded object also lands in the object cache, so later lookups
    /// of objects from this pack skip the decoder.
    pub async fn unpack_pack(&self, pack_id: &str) -> Result<UnpackedPack> {
        self.unpacked
            .get_or_fetch(&pack_id.to_string(), || async {
                let pack_ref = self.pack_ref(pack_id).await?;
                let index = self.pack_index_cached(&pack_ref).await?;
                let pack = self.packfile_cached(pack_id).await?;
                let bases = PackBases {
                    repo: self,
                    pack_id,
                    index: &index,
                    depth: 1,
                };
                let decoded = self
                    .decoder
                    .decode_pack(pack, &bases, self.config.max_object_size)
                    .await?;

                let mut objects = Vec::with_capacity(decoded.len());
                for (i, object) in decoded.into_iter().enumerate() {
                    let what = format!("entry {} of pack {}", i, pack_id);
                    let (kind, data) = self.read_bounded(&what, object).await?;
                    objects.push(self.cache_object(CachedObject::new(kind, data)));
                }
                debug!(pack = %pack_id, objects = objects.len(), "unpacked pack");
                Ok(UnpackedPack {
                    objects: objects.into(),
                })
            })
            .await
    }

    /// Read a decoded object into memory, checking the size ceiling first
    /// and the content against `id` after
    async fn materialize(&self, id: &ObjectId, object: Object) -> Result<CachedObject> {
        let what = format!("object {}", id);
        let (kind, data) = self.read_bounded(&what, object).await?;
        let cached = CachedObject::new(kind, data);
        if cached.id != *id {
            return Err(Error::MalformedObject(format!(
                "{} decodes to content hashing to {}",
                what, cached.id
            )));
        }
        Ok(cached)
    }

    async fn read_bounded(&self, what: &str, object: Object) -> Result<(ObjectKind, Bytes)> {
        let limit = self.config.max_object_size;
        if object.size > limit {
            return Err(Error::ObjectTooLarge {
                object: what.to_string(),
                size: object.size,
                limit,
            });
        }

        let kind = object.kind;
        let declared = object.size;
        let data = object.into_bytes().await?;
        if data.len() as u64 != declared {
            return Err(Error::MalformedObject(format!(
                "{}: decoded {} bytes, header declared {}",
                what,
                data.len(),
                declared
            )));
        }
        Ok((kind, data))
    }
}
