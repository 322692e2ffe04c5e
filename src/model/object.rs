//! Git objects as handed out by the repository
//!
//! An [`Object`] carries its kind, declared length and a readable content
//! stream. Objects that have been fully materialized (decoded from a pack)
//! are kept as [`CachedObject`] so they can be re-read any number of times.

use bytes::Bytes;
use gix_hash::ObjectId;
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Readable content of an object. Dropping it releases the underlying source.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// The four git object types
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "commit" => Ok(ObjectKind::Commit),
            "tree" => Ok(ObjectKind::Tree),
            "blob" => Ok(ObjectKind::Blob),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(Error::MalformedObject(format!("unknown object type '{}'", other))),
        }
    }
}

/// An object with its content as a stream
pub struct Object {
    pub kind: ObjectKind,
    /// Declared content length in bytes
    pub size: u64,
    pub content: ObjectReader,
}

impl Object {
    pub fn new(kind: ObjectKind, size: u64, content: ObjectReader) -> Self {
        Self { kind, size, content }
    }

    /// Wrap an in-memory buffer as a fresh readable object
    pub fn from_bytes(kind: ObjectKind, data: Bytes) -> Self {
        let size = data.len() as u64;
        Self {
            kind,
            size,
            content: Box::new(std::io::Cursor::new(data)),
        }
    }

    /// Drain the content stream into a single buffer
    pub async fn into_bytes(mut self) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(self.size as usize);
        self.content.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// A fully materialized object, kept in the decoded-object cache
#[derive(Debug, Clone)]
pub struct CachedObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub size: u64,
    pub data: Bytes,
}

impl CachedObject {
    /// Build a cache entry, computing the id from the content
    pub fn new(kind: ObjectKind, data: Bytes) -> Self {
        Self {
            id: hash_object(kind, &data),
            kind,
            size: data.len() as u64,
            data,
        }
    }

    /// A new readable stream over the cached bytes
    pub fn to_object(&self) -> Object {
        Object::from_bytes(self.kind, self.data.clone())
    }
}

/// The loose-object header git hashes ahead of the content: `"<type> <len>\0"`
pub fn object_header(kind: ObjectKind, size: u64) -> Vec<u8> {
    format!("{} {}\0", kind, size).into_bytes()
}

/// Compute the git object id of `data` stored as `kind`
pub fn hash_object(kind: ObjectKind, data: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(object_header(kind, data.len() as u64));
    hasher.update(data);
    id_from_digest(&hasher.finalize())
}

/// Convert a 20-byte SHA-1 digest into an id
pub(crate) fn id_from_digest(digest: &[u8]) -> ObjectId {
    ObjectId::try_from(digest).unwrap_or_else(|_| ObjectId::null(gix_hash::Kind::Sha1))
}

/// Build an id from 20 raw bytes (as found in tree entries and pack indices)
pub fn id_from_bytes(bytes: &[u8]) -> Result<ObjectId> {
    ObjectId::try_from(bytes)
        .map_err(|_| Error::MalformedObject(format!("expected 20-byte id, got {} bytes", bytes.len())))
}

/// Parse a 40-character hex id (as found in commit and tag headers)
pub fn parse_id(hex: &str) -> Result<ObjectId> {
    ObjectId::from_hex(hex.as_bytes())
        .map_err(|_| Error::MalformedObject(format!("invalid object id '{}'", hex)))
}
