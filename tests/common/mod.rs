// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use bytes::Bytes;
use git2::{Repository as GitRepository, Signature};
use gitview::model::{encode_tree, Object, ObjectKind, ObjectReader, Reference, TreeEntry};
use gitview::repository::parse_idx_v2;
use gitview::store::{
    BaseResolver, Cursor, GitDecoder, LooseStore, MemoryStore, PackDecoder, PackRecord, PackRef,
    PackStore, RefStore, VecCursor,
};
use gitview::{Error, Repository, Result};
use gix_hash::ObjectId;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const AUTHOR: &str = "A U Thor <author@example.com> 1700000000 +0000";
pub const COMMITTER: &str = "C O Mitter <committer@example.com> 1700000100 +0100";

// ===== In-memory fixtures =====

/// Commit text in git's canonical layout
pub fn commit_text(
    tree: ObjectId,
    parents: &[ObjectId],
    author: &str,
    committer: &str,
    message: &str,
) -> String {
    let mut text = format!("tree {}\n", tree);
    for parent in parents {
        text.push_str(&format!("parent {}\n", parent));
    }
    text.push_str(&format!("author {}\ncommitter {}\n\n{}", author, committer, message));
    text
}

/// Store a tree built from `(name, mode, id)` triples
pub fn add_tree(store: &MemoryStore, entries: &[(&str, u32, ObjectId)]) -> ObjectId {
    let entries: Vec<TreeEntry> = entries
        .iter()
        .map(|(name, mode, id)| TreeEntry::new(*name, *mode, *id))
        .collect();
    store.add_object(ObjectKind::Tree, encode_tree(&entries))
}

/// Store a commit by a single author who also committed it
pub fn add_commit_object(
    store: &MemoryStore,
    tree: ObjectId,
    parents: &[ObjectId],
    message: &str,
) -> ObjectId {
    let text = commit_text(tree, parents, AUTHOR, AUTHOR, message);
    store.add_object(ObjectKind::Commit, text.into_bytes())
}

/// Store an annotated tag pointing at `target`
pub fn add_tag_object(
    store: &MemoryStore,
    target: ObjectId,
    kind: ObjectKind,
    name: &str,
    message: &str,
) -> ObjectId {
    let text = format!(
        "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
        target, kind, name, AUTHOR, message
    );
    store.add_object(ObjectKind::Tag, text.into_bytes())
}

/// Decoder that counts how often each stage runs
#[derive(Default, Clone)]
pub struct CountingDecoder {
    index_parses: Arc<AtomicUsize>,
    object_decodes: Arc<AtomicUsize>,
    pack_decodes: Arc<AtomicUsize>,
}

impl CountingDecoder {
    pub fn index_parses(&self) -> usize {
        self.index_parses.load(Ordering::SeqCst)
    }

    pub fn object_decodes(&self) -> usize {
        self.object_decodes.load(Ordering::SeqCst)
    }

    pub fn pack_decodes(&self) -> usize {
        self.pack_decodes.load(Ordering::SeqCst)
    }
}

impl PackDecoder for CountingDecoder {
    fn parse_index(&self, data: &[u8]) -> Result<Vec<(ObjectId, u64)>> {
        self.index_parses.fetch_add(1, Ordering::SeqCst);
        parse_idx_v2(data)
    }

    async fn decode_object<B: BaseResolver>(
        &self,
        record: PackRecord,
        bases: &B,
        max_size: u64,
    ) -> Result<Object> {
        self.object_decodes.fetch_add(1, Ordering::SeqCst);
        GitDecoder.decode_object(record, bases, max_size).await
    }

    async fn decode_pack<B: BaseResolver>(
        &self,
        pack: Bytes,
        bases: &B,
        max_size: u64,
    ) -> Result<Vec<Object>> {
        self.pack_decodes.fetch_add(1, Ordering::SeqCst);
        GitDecoder.decode_pack(pack, bases, max_size).await
    }
}

/// A cursor that fails once `fail_after` items have been read
pub struct FailingCursor<T> {
    inner: VecCursor<T>,
    read: usize,
    fail_after: Option<usize>,
}

impl<T> Cursor for FailingCursor<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>> {
        if self.fail_after == Some(self.read) {
            return Err(Error::Store("listing interrupted".into()));
        }
        self.read += 1;
        self.inner.next().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

/// A [`MemoryStore`] wrapper that can suspend or fail on demand
#[derive(Default)]
pub struct TestStore {
    pub inner: MemoryStore,
    /// Yield to the runtime before serving pack bytes
    pub slow_packs: bool,
    /// Fail every loose lookup with a store error
    pub broken_loose: bool,
    /// Fail the ref listing after this many refs
    pub broken_refs_after: Option<usize>,
    /// Fail every pack index fetch
    pub broken_index: bool,
}

impl TestStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }
}

impl LooseStore for TestStore {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<Object>> {
        if self.broken_loose {
            return Err(Error::Store("loose store offline".into()));
        }
        self.inner.get_object(id).await
    }

    async fn has_object(&self, id: &ObjectId) -> Result<bool> {
        if self.broken_loose {
            return Err(Error::Store("loose store offline".into()));
        }
        self.inner.has_object(id).await
    }
}

impl RefStore for TestStore {
    type Refs = FailingCursor<Reference>;

    async fn refs(&self) -> Result<Self::Refs> {
        Ok(FailingCursor {
            inner: self.inner.refs().await?,
            read: 0,
            fail_after: self.broken_refs_after,
        })
    }
}

impl PackStore for TestStore {
    type Packs = VecCursor<PackRef>;

    async fn packs(&self) -> Result<Self::Packs> {
        self.inner.packs().await
    }

    async fn pack_index(&self, idx_id: &str) -> Result<Bytes> {
        if self.broken_index {
            return Err(Error::Store(format!("pack index {} unreadable", idx_id)));
        }
        if self.slow_packs {
            tokio::task::yield_now().await;
        }
        self.inner.pack_index(idx_id).await
    }

    async fn packfile(&self, pack_id: &str) -> Result<ObjectReader> {
        if self.slow_packs {
            tokio::task::yield_now().await;
        }
        self.inner.packfile(pack_id).await
    }
}

pub fn memory_repo(store: MemoryStore) -> Repository<MemoryStore, GitDecoder> {
    Repository::new(store, GitDecoder)
}

// ===== On-disk fixtures =====

/// Create a temporary git repository
pub fn create_test_repo() -> (TempDir, PathBuf, GitRepository) {
    let dir = TempDir::new().unwrap();
    let repo_path = dir.path().to_path_buf();
    let repo = GitRepository::init(&repo_path).unwrap();

    // Configure git user for commits
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();

    (dir, repo_path, repo)
}

/// Write files to the work tree and commit them on top of HEAD
pub fn add_commit(repo: &GitRepository, files: &[(&str, &[u8])], message: &str) -> ObjectId {
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let mut index = repo.index().unwrap();

    for (path, content) in files {
        let full_path = repo.workdir().unwrap().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
        index.add_path(std::path::Path::new(path)).unwrap();
    }

    index.write().unwrap();
    commit_index(repo, &mut index, &sig, message)
}

/// Remove a file from the index and commit
pub fn remove_file_commit(repo: &GitRepository, path: &str, message: &str) -> ObjectId {
    let sig = Signature::now("Test User", "test@example.com").unwrap();

    let full_path = repo.workdir().unwrap().join(path);
    if full_path.exists() {
        std::fs::remove_file(&full_path).unwrap();
    }

    let mut index = repo.index().unwrap();
    index.remove_path(std::path::Path::new(path)).unwrap();
    index.write().unwrap();
    commit_index(repo, &mut index, &sig, message)
}

fn commit_index(
    repo: &GitRepository,
    index: &mut git2::Index,
    sig: &Signature,
    message: &str,
) -> ObjectId {
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let oid = repo
        .commit(Some("HEAD"), sig, sig, message, &tree, &parents)
        .unwrap();
    to_id(oid)
}

/// Pack every object reachable from HEAD into `objects/pack` with libgit2,
/// then delete the loose copies so reads must go through the pack
pub fn pack_and_prune(repo: &GitRepository) {
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    let mut builder = repo.packbuilder().unwrap();
    builder.insert_walk(&mut walk).unwrap();

    let objects = repo.path().join("objects");
    let pack_dir = objects.join("pack");
    std::fs::create_dir_all(&pack_dir).unwrap();
    builder.write(&pack_dir, 0).unwrap();

    for entry in std::fs::read_dir(&objects).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit()) {
            std::fs::remove_dir_all(entry.path()).unwrap();
        }
    }
}

pub fn to_id(oid: git2::Oid) -> ObjectId {
    ObjectId::try_from(oid.as_bytes()).unwrap()
}
