//! Git packfiles
//!
//! [`GitDecoder`] reads the format `git` itself writes: a 12-byte header,
//! zlib-compressed entries each behind a type/size header, and a SHA-1
//! trailer. Entry headers are parsed with `gix-pack`; offset deltas are
//! resolved against earlier entries of the same pack, ref deltas through the
//! [`BaseResolver`].
//!
//! [`PackBuilder`] writes packs in the same format, with a v2 index, for
//! embedding objects and for tests.

use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use gix_hash::ObjectId;
use gix_pack::data::{self, entry::Header};
use rustc_hash::FxHashMap;
use sha1::{Digest, Sha1};
use std::io::Write;

use crate::error::{Error, Result};
use crate::model::{hash_object, CachedObject, Object, ObjectKind};
use crate::repository::write_idx_v2;

use super::delta::{apply_delta, encode_delta};
use super::{BaseResolver, PackDecoder, PackRecord};

const PACK_HEADER_LEN: usize = 12;
const HASH_LEN: usize = 20;
/// Longest valid size varint in an entry header (4 + 9 * 7 bits)
const MAX_SIZE_BYTES: usize = 10;
/// Longest offset varint that cannot overflow 64 bits
const MAX_DISTANCE_BYTES: usize = 9;
/// Cap on entries reserved up front from an untrusted header count
const MAX_PREALLOCATED: usize = 1024;
/// Output buffer growth step while inflating
const INFLATE_CHUNK: usize = 64 * 1024;

const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

fn malformed(what: impl std::fmt::Display) -> Error {
    Error::MalformedObject(format!("pack: {}", what))
}

fn base_header(kind: ObjectKind) -> Header {
    match kind {
        ObjectKind::Commit => Header::Commit,
        ObjectKind::Tree => Header::Tree,
        ObjectKind::Blob => Header::Blob,
        ObjectKind::Tag => Header::Tag,
    }
}

fn base_kind(header: &Header) -> Result<ObjectKind> {
    match header {
        Header::Commit => Ok(ObjectKind::Commit),
        Header::Tree => Ok(ObjectKind::Tree),
        Header::Blob => Ok(ObjectKind::Blob),
        Header::Tag => Ok(ObjectKind::Tag),
        Header::OfsDelta { .. } | Header::RefDelta { .. } => Err(malformed("delta has no kind")),
    }
}

/// Length of the varint starting at `data[0]`, if it ends within `max` bytes
fn varint_len(data: &[u8], max: usize) -> Option<usize> {
    data.iter()
        .take(max)
        .position(|b| b & 0x80 == 0)
        .map(|last| last + 1)
}

/// Reject entry headers gix-pack would choke on: reserved types and
/// varints too long for 64 bits
fn check_entry_header(data: &[u8], offset: u64) -> Result<()> {
    let first = *data
        .first()
        .ok_or_else(|| malformed(format!("entry at {} is empty", offset)))?;
    let type_id = (first >> 4) & 0x7;
    if matches!(type_id, 0 | 5) {
        return Err(malformed(format!("entry at {} has reserved type {}", offset, type_id)));
    }

    let size_len = varint_len(data, MAX_SIZE_BYTES)
        .ok_or_else(|| malformed(format!("entry at {}: size truncated or too long", offset)))?;
    if type_id == OFS_DELTA && varint_len(&data[size_len..], MAX_DISTANCE_BYTES).is_none() {
        return Err(malformed(format!("entry at {}: base distance truncated or too long", offset)));
    }
    if type_id == REF_DELTA && data.len() < size_len + HASH_LEN {
        return Err(malformed(format!("entry at {}: base id truncated", offset)));
    }
    Ok(())
}

/// Parse the entry header at the start of `data`, returning the entry and
/// its compressed body
fn read_entry(data: &[u8], offset: u64, max_size: u64) -> Result<(data::Entry, &[u8])> {
    check_entry_header(data, offset)?;
    let mut body = data;
    let entry = data::Entry::from_read(&mut body, offset, HASH_LEN)
        .map_err(|e| malformed(format!("entry at {}: {}", offset, e)))?;

    if entry.decompressed_size > max_size {
        return Err(Error::ObjectTooLarge {
            object: format!("pack entry at offset {}", offset),
            size: entry.decompressed_size,
            limit: max_size,
        });
    }
    Ok((entry, body))
}

/// Inflate exactly one zlib stream of `size` bytes from the start of `data`,
/// returning the content and the number of compressed bytes consumed
fn inflate(data: &[u8], size: u64) -> Result<(Vec<u8>, usize)> {
    let size = usize::try_from(size).map_err(|_| malformed("entry size"))?;
    // The declared size is untrusted: grow towards it as output arrives,
    // with one spare byte so a stream longer than declared is noticed
    let mut out = Vec::with_capacity(size.min(INFLATE_CHUNK) + 1);
    let mut zlib = Decompress::new(true);
    let status = loop {
        let read = usize::try_from(zlib.total_in()).map_err(|_| malformed("entry size"))?;
        let status = zlib
            .decompress_vec(&data[read..], &mut out, FlushDecompress::Finish)
            .map_err(|e| malformed(format!("zlib: {}", e)))?;
        let full = out.len() == out.capacity();
        if matches!(status, Status::StreamEnd) || !full || out.len() > size {
            break status;
        }
        out.reserve((size + 1 - out.len()).min(INFLATE_CHUNK));
    };

    if !matches!(status, Status::StreamEnd) || out.len() != size {
        return Err(malformed(format!(
            "entry inflates to {}{} bytes, header declared {}",
            out.len(),
            if matches!(status, Status::StreamEnd) { "" } else { "+" },
            size
        )));
    }
    let consumed = usize::try_from(zlib.total_in()).map_err(|_| malformed("entry size"))?;
    Ok((out, consumed))
}

/// Offset of the base an offset delta at `offset` points back to
fn delta_base_offset(offset: u64, distance: u64) -> Result<u64> {
    offset
        .checked_sub(distance)
        .filter(|base| distance > 0 && *base >= PACK_HEADER_LEN as u64)
        .ok_or_else(|| {
            malformed(format!("entry at {} points {} bytes back, outside the pack", offset, distance))
        })
}

async fn resolve_delta(base: Object, delta: &[u8], max_size: u64) -> Result<Object> {
    if base.size > max_size {
        return Err(Error::ObjectTooLarge {
            object: "delta base".to_string(),
            size: base.size,
            limit: max_size,
        });
    }
    let kind = base.kind;
    let base = base.into_bytes().await?;
    let data = apply_delta(&base, delta, max_size)?;
    Ok(Object::from_bytes(kind, Bytes::from(data)))
}

/// [`PackDecoder`] for git's own pack format
#[derive(Debug, Default, Clone, Copy)]
pub struct GitDecoder;

impl PackDecoder for GitDecoder {
    async fn decode_object<B: BaseResolver>(
        &self,
        record: PackRecord,
        bases: &B,
        max_size: u64,
    ) -> Result<Object> {
        let (entry, body) = read_entry(&record.data, record.offset, max_size)?;
        let (data, _) = inflate(body, entry.decompressed_size)?;

        match entry.header {
            Header::RefDelta { base_id } => {
                let base = bases.base_object(&base_id).await?;
                resolve_delta(base, &data, max_size).await
            }
            Header::OfsDelta { base_distance } => {
                let base_offset = delta_base_offset(record.offset, base_distance)?;
                let base = bases.base_at_offset(base_offset).await?;
                resolve_delta(base, &data, max_size).await
            }
            header => Ok(Object::from_bytes(base_kind(&header)?, Bytes::from(data))),
        }
    }

    async fn decode_pack<B: BaseResolver>(
        &self,
        pack: Bytes,
        bases: &B,
        max_size: u64,
    ) -> Result<Vec<Object>> {
        let header: &[u8; PACK_HEADER_LEN] = pack
            .get(..PACK_HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| malformed("shorter than its header"))?;
        let (_, count) = data::header::decode(header).map_err(malformed)?;
        let body_end = pack
            .len()
            .checked_sub(HASH_LEN)
            .filter(|end| *end >= PACK_HEADER_LEN)
            .ok_or_else(|| malformed("missing trailer"))?;

        let count = count as usize;
        let mut objects = Vec::with_capacity(count.min(MAX_PREALLOCATED));
        // Offset deltas only point backwards, so every base is already here
        let mut decoded: FxHashMap<u64, (ObjectKind, Bytes)> = FxHashMap::default();
        let mut pos = PACK_HEADER_LEN;

        for i in 0..count {
            if pos >= body_end {
                return Err(malformed(format!("ends after {} of {} entries", i, count)));
            }
            let offset = pos as u64;
            let (entry, body) = read_entry(&pack[pos..body_end], offset, max_size)?;
            let body_at = body_end - body.len();
            let (data, consumed) = inflate(body, entry.decompressed_size)?;
            pos = body_at + consumed;

            let (kind, data) = match entry.header {
                Header::RefDelta { base_id } => {
                    let base = bases.base_object(&base_id).await?;
                    let object = resolve_delta(base, &data, max_size).await?;
                    (object.kind, object.into_bytes().await?)
                }
                Header::OfsDelta { base_distance } => {
                    let base_offset = delta_base_offset(offset, base_distance)?;
                    let (kind, base) = decoded.get(&base_offset).ok_or_else(|| {
                        malformed(format!("entry at {} has no base at {}", offset, base_offset))
                    })?;
                    (*kind, Bytes::from(apply_delta(base, &data, max_size)?))
                }
                header => (base_kind(&header)?, Bytes::from(data)),
            };

            decoded.insert(offset, (kind, data.clone()));
            objects.push(Object::from_bytes(kind, data));
        }
        Ok(objects)
    }
}

/// A finished pack and its v2 index
#[derive(Debug, Clone)]
pub struct BuiltPack {
    /// `pack-<checksum>`; the files are `<name>.pack` and `<name>.idx`
    pub name: String,
    pub pack: Bytes,
    pub index: Bytes,
    /// Ids of the objects in the pack, in pack order
    pub ids: Vec<ObjectId>,
    /// Offset of each object, parallel to `ids`
    pub offsets: Vec<u64>,
}

impl BuiltPack {
    pub fn pack_id(&self) -> String {
        format!("{}.pack", self.name)
    }

    pub fn idx_id(&self) -> String {
        format!("{}.idx", self.name)
    }
}

/// Builds a git packfile entry by entry
#[derive(Debug, Default)]
pub struct PackBuilder {
    entries: Vec<u8>,
    objects: Vec<(ObjectId, u64)>,
    offsets: FxHashMap<ObjectId, u64>,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_offset(&self) -> u64 {
        (PACK_HEADER_LEN + self.entries.len()) as u64
    }

    fn push(&mut self, id: ObjectId, header: Header, payload: &[u8]) -> ObjectId {
        let offset = self.next_offset();
        // Writes into a Vec cannot fail
        let _ = header.write_to(payload.len() as u64, &mut self.entries);
        let mut encoder = ZlibEncoder::new(&mut self.entries, Compression::default());
        let _ = encoder.write_all(payload);
        let _ = encoder.finish();

        self.objects.push((id, offset));
        self.offsets.entry(id).or_insert(offset);
        id
    }

    /// Store `data` whole
    pub fn add(&mut self, kind: ObjectKind, data: &[u8]) -> ObjectId {
        let id = hash_object(kind, data);
        self.push(id, base_header(kind), data)
    }

    /// Store `target` as a delta against `base`: an offset delta when the
    /// base is already in this pack, a ref delta otherwise
    pub fn add_delta(&mut self, base: &CachedObject, target: &[u8]) -> ObjectId {
        let header = match self.offsets.get(&base.id) {
            Some(base_offset) => Header::OfsDelta {
                base_distance: self.next_offset() - base_offset,
            },
            None => Header::RefDelta { base_id: base.id },
        };
        self.push_delta(base, target, header)
    }

    /// Store `target` as a delta against `base`, always naming the base by id
    pub fn add_ref_delta(&mut self, base: &CachedObject, target: &[u8]) -> ObjectId {
        self.push_delta(base, target, Header::RefDelta { base_id: base.id })
    }

    fn push_delta(&mut self, base: &CachedObject, target: &[u8], header: Header) -> ObjectId {
        let id = hash_object(base.kind, target);
        let delta = encode_delta(&base.data, target);
        self.push(id, header, &delta)
    }

    pub fn finish(self) -> BuiltPack {
        let mut pack = Vec::with_capacity(PACK_HEADER_LEN + self.entries.len() + HASH_LEN);
        pack.extend_from_slice(&data::header::encode(
            data::Version::V2,
            self.objects.len() as u32,
        ));
        pack.extend_from_slice(&self.entries);

        let checksum: [u8; HASH_LEN] = Sha1::digest(&pack).into();
        pack.extend_from_slice(&checksum);

        BuiltPack {
            name: format!("pack-{}", hex::encode(checksum)),
            index: Bytes::from(write_idx_v2(&self.objects, &checksum)),
            pack: Bytes::from(pack),
            ids: self.objects.iter().map(|(id, _)| *id).collect(),
            offsets: self.objects.iter().map(|(_, offset)| *offset).collect(),
        }
    }
}
