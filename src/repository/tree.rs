//! Tree decoding and path walking
//!
//! A tree object is a bare concatenation of entries, each
//! `<octal mode> <name>\0<20-byte id>`. There is no count prefix: the
//! sequence ends where the object ends, and it must end on an entry boundary.
//!
//! Names are raw bytes on disk. A name that is not valid UTF-8 is surfaced
//! with U+FFFD replacements, so two distinct names can read the same. Path
//! lookups never match such an entry; it is only visible when listing.

use bytes::Bytes;
use gix_hash::ObjectId;
use std::fmt;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::error::{Error, Result};
use crate::model::{id_from_bytes, split_path, Object, ObjectKind, ObjectReader, TreeEntry};
use crate::store::{Cursor, ObjectStore, PackDecoder};

use super::Repository;

const ID_LEN: usize = 20;

/// Forward-only stream of a tree's entries, in on-disk order
pub struct TreeEntries {
    reader: Option<BufReader<ObjectReader>>,
    id: ObjectId,
    header: Vec<u8>,
    /// The last entry's name was not valid UTF-8
    lossy: bool,
}

impl TreeEntries {
    /// Decode the tree `object`, whose id is `id`
    pub fn new(object: Object, id: ObjectId) -> Self {
        Self {
            reader: Some(BufReader::new(object.content)),
            id,
            header: Vec::new(),
            lossy: false,
        }
    }

    /// Id of the tree being decoded
    pub fn id(&self) -> ObjectId {
        self.id
    }

    async fn step(&mut self) -> Result<Option<TreeEntry>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        self.header.clear();
        let n = reader.read_until(0, &mut self.header).await?;
        if n == 0 {
            self.reader = None;
            return Ok(None);
        }
        if self.header.pop() != Some(0) {
            return Err(Error::MalformedObject(format!(
                "tree {}: entry header truncated",
                self.id
            )));
        }

        let space = self.header.iter().position(|&b| b == b' ').ok_or_else(|| {
            Error::MalformedObject(format!("tree {}: entry without a name", self.id))
        })?;
        let (mode, name) = (&self.header[..space], &self.header[space + 1..]);
        let mode = std::str::from_utf8(mode)
            .ok()
            .and_then(|mode| u32::from_str_radix(mode, 8).ok())
            .ok_or_else(|| {
                Error::MalformedObject(format!(
                    "tree {}: bad mode '{}'",
                    self.id,
                    String::from_utf8_lossy(mode)
                ))
            })?;
        let (name, lossy) = match std::str::from_utf8(name) {
            Ok(name) => (name.to_string(), false),
            Err(_) => (String::from_utf8_lossy(name).into_owned(), true),
        };
        self.lossy = lossy;

        let mut raw = [0u8; ID_LEN];
        reader
            .read_exact(&mut raw)
            .await
            .map_err(|e| Error::truncated(e, &format!("tree {} entry '{}'", self.id, name)))?;

        Ok(Some(TreeEntry::new(name, mode, id_from_bytes(&raw)?)))
    }
}

impl Cursor for TreeEntries {
    type Item = TreeEntry;

    async fn next(&mut self) -> Result<Option<TreeEntry>> {
        let result = self.step().await;
        if result.is_err() {
            self.reader = None;
        }
        result
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// Scan `entries` for the first entry called `name`, then close them.
/// Entries whose on-disk name is not UTF-8 never match.
async fn find_entry(entries: &mut TreeEntries, name: &str) -> Result<Option<TreeEntry>> {
    let found = loop {
        match entries.next().await {
            Ok(Some(entry)) if !entries.lossy && entry.name == name => break Ok(Some(entry)),
            Ok(Some(_)) => {}
            Ok(None) => break Ok(None),
            Err(err) => break Err(err),
        }
    };
    entries.close().await?;
    found
}

fn not_found(segment: &str) -> Error {
    Error::NotFound(format!("file '{}' not found", segment))
}

/// A file's content, ready to be streamed
pub struct File {
    pub id: ObjectId,
    pub mode: u32,
    pub size: u64,
    pub content: ObjectReader,
}

impl File {
    /// Read the whole file into memory
    pub async fn into_bytes(self) -> Result<Bytes> {
        Object::new(ObjectKind::Blob, self.size, self.content)
            .into_bytes()
            .await
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("id", &self.id)
            .field("mode", &format_args!("{:o}", self.mode))
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore, D: PackDecoder> Repository<S, D> {
    /// Entries of the tree `id` names, peeling commits and tags
    pub async fn tree_entries(&self, id: ObjectId) -> Result<TreeEntries> {
        let (object, id) = self.peel(id, ObjectKind::Tree).await?;
        Ok(TreeEntries::new(object, id))
    }

    /// Entries of the root tree of `rev`
    pub async fn read_tree(&self, rev: &str) -> Result<TreeEntries> {
        let (object, id) = self.get_tree(rev).await?;
        Ok(TreeEntries::new(object, id))
    }

    /// Entries of the directory at `path` inside `rev`; an empty path is the root
    pub async fn read_dir(&self, rev: &str, path: &str) -> Result<TreeEntries> {
        self.walk(rev, &split_path(path)).await
    }

    async fn walk(&self, rev: &str, segments: &[&str]) -> Result<TreeEntries> {
        let mut entries = self.read_tree(rev).await?;
        for (depth, segment) in segments.iter().enumerate() {
            let entry = find_entry(&mut entries, segment)
                .await?
                .ok_or_else(|| not_found(segment))?;
            if !entry.is_tree() {
                return Err(Error::BadPath(format!(
                    "'{}' is not a directory",
                    segments[..=depth].join("/")
                )));
            }
            entries = self.tree_entries(entry.id).await?;
        }
        Ok(entries)
    }

    /// The tree entry at `path` inside `rev`
    pub async fn entry_at(&self, rev: &str, path: &str) -> Result<TreeEntry> {
        let segments = split_path(path);
        let Some((name, dir)) = segments.split_last() else {
            return Err(Error::InvalidArgument("empty path".into()));
        };

        let mut entries = self.walk(rev, dir).await?;
        find_entry(&mut entries, name)
            .await?
            .ok_or_else(|| not_found(name))
    }

    /// Open the file at `path` inside `rev`.
    ///
    /// The entry must name a blob. A tree, a submodule commit or any other
    /// kind fails with [`Error::UnexpectedType`]; a missing entry fails with
    /// [`Error::NotFound`].
    pub async fn get_file(&self, rev: &str, path: &str) -> Result<File> {
        let entry = self.entry_at(rev, path).await?;
        let object = self.get_object_from_any(&entry.id).await?;
        if object.kind != ObjectKind::Blob {
            return Err(Error::UnexpectedType {
                expected: ObjectKind::Blob,
                actual: object.kind,
            });
        }
        Ok(File {
            id: entry.id,
            mode: entry.mode,
            size: object.size,
            content: object.content,
        })
    }
}
