//! Pack index lookup
//!
//! A parsed index maps object ids to their byte range inside the packfile.
//! Ranges are derived the same way on-disk sizes are: sort entries by
//! offset, each entry ends where the next one starts, the last one runs to
//! the end of the pack.

use gix_hash::ObjectId;
use rustc_hash::FxHashMap;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::model::id_from_bytes;

const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
const IDX_VERSION: u32 = 2;
const FANOUT_LEN: usize = 256 * 4;
const HEADER_LEN: usize = 8;
const ID_LEN: usize = 20;
/// Offsets with this bit set point into the 64-bit offset table
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Location of one object inside a pack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    /// Offset of the next object, `None` for the last object in the pack
    pub end: Option<u64>,
}

/// A parsed pack index
#[derive(Debug, Default)]
pub struct PackIndex {
    entries: FxHashMap<ObjectId, IndexEntry>,
    /// `(offset, id)` in offset order, for offset delta bases
    by_offset: Vec<(u64, ObjectId)>,
}

impl PackIndex {
    /// Build an index from `(id, offset)` pairs in any order
    pub fn new(mut entries: Vec<(ObjectId, u64)>) -> Self {
        entries.sort_by_key(|(_, offset)| *offset);

        let mut by_id = FxHashMap::default();
        by_id.reserve(entries.len());

        for (i, (id, offset)) in entries.iter().enumerate() {
            let end = entries.get(i + 1).map(|(_, next)| *next);
            by_id.insert(*id, IndexEntry { offset: *offset, end });
        }

        Self {
            entries: by_id,
            by_offset: entries.into_iter().map(|(id, offset)| (offset, id)).collect(),
        }
    }

    pub fn find(&self, id: &ObjectId) -> Option<IndexEntry> {
        self.entries.get(id).copied()
    }

    /// The object whose entry starts exactly at `offset`
    pub fn at_offset(&self, offset: u64) -> Option<(ObjectId, IndexEntry)> {
        let i = self
            .by_offset
            .binary_search_by_key(&offset, |(start, _)| *start)
            .ok()?;
        let end = self.by_offset.get(i + 1).map(|(next, _)| *next);
        Some((self.by_offset[i].1, IndexEntry { offset, end }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Parse a version 2 pack index into `(id, offset)` pairs
pub fn parse_idx_v2(data: &[u8]) -> Result<Vec<(ObjectId, u64)>> {
    let malformed = |what: &str| Error::MalformedObject(format!("pack index: {}", what));

    if data.len() < HEADER_LEN + FANOUT_LEN + 2 * ID_LEN {
        return Err(malformed("too short"));
    }
    if data[..4] != IDX_MAGIC {
        return Err(malformed("bad magic"));
    }
    let version = read_u32(data, 4);
    if version != IDX_VERSION {
        return Err(malformed(&format!("unsupported version {}", version)));
    }

    let count = read_u32(data, HEADER_LEN + FANOUT_LEN - 4) as usize;
    let ids_at = HEADER_LEN + FANOUT_LEN;
    let crcs_at = ids_at + count * ID_LEN;
    let offsets_at = crcs_at + count * 4;
    let large_at = offsets_at + count * 4;

    if data.len() < large_at + 2 * ID_LEN {
        return Err(malformed("truncated tables"));
    }
    let large_count = (data.len() - large_at - 2 * ID_LEN) / 8;

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let id = id_from_bytes(&data[ids_at + i * ID_LEN..ids_at + (i + 1) * ID_LEN])?;
        let raw = read_u32(data, offsets_at + i * 4);
        let offset = if raw & LARGE_OFFSET_FLAG == 0 {
            raw as u64
        } else {
            let slot = (raw & !LARGE_OFFSET_FLAG) as usize;
            if slot >= large_count {
                return Err(malformed("large offset out of range"));
            }
            let at = large_at + slot * 8;
            (read_u32(data, at) as u64) << 32 | read_u32(data, at + 4) as u64
        };
        entries.push((id, offset));
    }

    Ok(entries)
}

/// Write a version 2 pack index for `entries`.
///
/// CRC32 values are written as zero; nothing in this crate checks them.
pub fn write_idx_v2(entries: &[(ObjectId, u64)], pack_checksum: &[u8; 20]) -> Vec<u8> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::with_capacity(HEADER_LEN + FANOUT_LEN + sorted.len() * 28 + 40);
    out.extend_from_slice(&IDX_MAGIC);
    out.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let mut fanout = [0u32; 256];
    for (id, _) in &sorted {
        fanout[id.as_bytes()[0] as usize] += 1;
    }
    let mut running = 0u32;
    for slot in fanout.iter_mut() {
        running += *slot;
        *slot = running;
    }
    for count in fanout {
        out.extend_from_slice(&count.to_be_bytes());
    }

    for (id, _) in &sorted {
        out.extend_from_slice(id.as_bytes());
    }
    out.extend(std::iter::repeat_n(0u8, sorted.len() * 4));

    let mut large = Vec::new();
    for (_, offset) in &sorted {
        if *offset < LARGE_OFFSET_FLAG as u64 {
            out.extend_from_slice(&(*offset as u32).to_be_bytes());
        } else {
            let slot = large.len() as u32 | LARGE_OFFSET_FLAG;
            out.extend_from_slice(&slot.to_be_bytes());
            large.push(*offset);
        }
    }
    for offset in large {
        out.extend_from_slice(&offset.to_be_bytes());
    }

    out.extend_from_slice(pack_checksum);
    let checksum = Sha1::digest(&out);
    out.extend_from_slice(&checksum);
    out
}
