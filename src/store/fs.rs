//! Object store backed by a `.git` directory on disk
//!
//! - loose objects: zlib-compressed `"<type> <len>\0<content>"` under
//!   `objects/xx/yyyy…`
//! - refs: files under `refs/`, then `packed-refs` for names without a file,
//!   then `HEAD` (a symbolic `HEAD` is followed one level)
//! - packs: every `objects/pack/*.idx` with its `.pack` sibling

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use gix_hash::ObjectId;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{is_object_id, parse_id, Object, ObjectKind, ObjectReader, Reference};

use super::{LooseStore, PackRef, PackStore, RefStore, VecCursor};

const SYMREF_PREFIX: &str = "ref: ";

/// Read-only store over a git directory
#[derive(Debug, Clone)]
pub struct FsStore {
    git_dir: PathBuf,
}

impl FsStore {
    /// Open a repository: either a work tree containing `.git`, or a bare
    /// repository / git directory itself
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dot_git = path.join(".git");
        let git_dir = if dot_git.is_dir() {
            dot_git
        } else if path.join("objects").is_dir() && path.join("HEAD").is_file() {
            path.to_path_buf()
        } else {
            return Err(Error::InvalidArgument(format!(
                "{} is not a git repository",
                path.display()
            )));
        };
        debug!(git_dir = %git_dir.display(), "opened repository");
        Ok(Self { git_dir })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn loose_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_string();
        self.git_dir.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    fn pack_dir(&self) -> PathBuf {
        self.git_dir.join("objects").join("pack")
    }

    /// Read a file, mapping "does not exist" to `None`
    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Loose ref files under `refs/`, as raw (possibly symbolic) targets
    async fn loose_refs(&self) -> Result<BTreeMap<String, String>> {
        let mut found = BTreeMap::new();
        let mut pending = vec![("refs".to_string(), self.git_dir.join("refs"))];

        while let Some((name, dir)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let child = format!("{}/{}", name, file_name);
                if entry.file_type().await?.is_dir() {
                    pending.push((child, entry.path()));
                } else {
                    let content = tokio::fs::read_to_string(entry.path()).await?;
                    found.insert(child, content.trim().to_string());
                }
            }
        }
        Ok(found)
    }

    /// Entries of `packed-refs`, skipping comments and peeled lines
    async fn packed_refs(&self) -> Result<Vec<(String, String)>> {
        let Some(data) = Self::read_optional(&self.git_dir.join("packed-refs")).await? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8_lossy(&data);
        Ok(text
            .lines()
            .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
            .filter_map(|line| line.split_once(' '))
            .map(|(id, name)| (name.trim().to_string(), id.to_string()))
            .collect())
    }
}

/// Resolve a raw ref target: an id, or `ref: <name>` looked up one level
fn resolve_target(target: &str, direct: &BTreeMap<String, ObjectId>) -> Option<ObjectId> {
    match target.strip_prefix(SYMREF_PREFIX) {
        Some(name) => direct.get(name.trim()).copied(),
        None if is_object_id(target) => parse_id(target).ok(),
        None => None,
    }
}

fn parse_loose(id: &ObjectId, compressed: &[u8]) -> Result<Object> {
    let mut data = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut data)
        .map_err(|e| Error::MalformedObject(format!("object {}: {}", id, e)))?;

    let nul = data
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::MalformedObject(format!("object {}: header without NUL", id)))?;
    let header = String::from_utf8_lossy(&data[..nul]);
    let (kind, size) = header
        .split_once(' ')
        .ok_or_else(|| Error::MalformedObject(format!("object {}: bad header '{}'", id, header)))?;
    let kind: ObjectKind = kind.parse()?;
    let size: u64 = size
        .parse()
        .map_err(|_| Error::MalformedObject(format!("object {}: bad size '{}'", id, size)))?;

    let content = Bytes::from(data).slice(nul + 1..);
    if content.len() as u64 != size {
        return Err(Error::MalformedObject(format!(
            "object {}: header says {} bytes, found {}",
            id,
            size,
            content.len()
        )));
    }
    Ok(Object::from_bytes(kind, content))
}

impl LooseStore for FsStore {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<Object>> {
        match Self::read_optional(&self.loose_path(id)).await? {
            Some(compressed) => parse_loose(id, &compressed).map(Some),
            None => Ok(None),
        }
    }

    async fn has_object(&self, id: &ObjectId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.loose_path(id)).await?)
    }
}

impl RefStore for FsStore {
    type Refs = VecCursor<Reference>;

    async fn refs(&self) -> Result<Self::Refs> {
        let loose = self.loose_refs().await?;
        let packed = self.packed_refs().await?;

        let mut direct = BTreeMap::new();
        for (name, target) in packed.iter().map(|(n, t)| (n, t)).chain(loose.iter()) {
            if is_object_id(target) {
                // Loose files come last and shadow packed entries
                direct.insert(name.clone(), parse_id(target)?);
            }
        }

        let mut refs = direct.clone();
        for (name, target) in &loose {
            if target.starts_with(SYMREF_PREFIX) {
                match resolve_target(target, &direct) {
                    Some(id) => {
                        refs.insert(name.clone(), id);
                    }
                    None => warn!(%name, %target, "dangling symbolic ref"),
                }
            }
        }

        if let Some(head) = Self::read_optional(&self.git_dir.join("HEAD")).await? {
            let head = String::from_utf8_lossy(&head);
            if let Some(id) = resolve_target(head.trim(), &direct) {
                refs.insert("HEAD".to_string(), id);
            }
        }

        Ok(VecCursor::new(
            refs.into_iter().map(|(name, id)| Reference::new(name, id)).collect(),
        ))
    }
}

impl PackStore for FsStore {
    type Packs = VecCursor<PackRef>;

    async fn packs(&self) -> Result<Self::Packs> {
        let mut entries = match tokio::fs::read_dir(self.pack_dir()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(VecCursor::new(Vec::new())),
            Err(err) => return Err(err.into()),
        };

        let mut packs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = file_name.strip_suffix(".idx") {
                packs.push(PackRef {
                    idx_id: file_name.clone(),
                    pack_id: format!("{}.pack", stem),
                });
            }
        }
        packs.sort_by(|a, b| a.idx_id.cmp(&b.idx_id));
        Ok(VecCursor::new(packs))
    }

    async fn pack_index(&self, idx_id: &str) -> Result<Bytes> {
        let path = self.pack_dir().join(idx_id);
        Self::read_optional(&path)
            .await?
            .map(Bytes::from)
            .ok_or_else(|| Error::NotFound(format!("pack index {} not found", idx_id)))
    }

    async fn packfile(&self, pack_id: &str) -> Result<ObjectReader> {
        let path = self.pack_dir().join(pack_id);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("packfile {} not found", pack_id)))
            }
            Err(err) => Err(err.into()),
        }
    }
}
