// Filesystem store integration tests
// Reads real (temporary) git repositories written by libgit2

mod common;

use common::{add_commit, create_test_repo, pack_and_prune, remove_file_commit, to_id};
use gitview::model::{ObjectKind, MODE_BLOB, MODE_TREE};
use gitview::repository::parse_idx_v2;
use gitview::store::{Cursor, FsStore, GitDecoder, PackBuilder};
use gitview::{Error, Repository};

fn open(path: &std::path::Path) -> Repository<FsStore, GitDecoder> {
    Repository::new(FsStore::open(path).unwrap(), GitDecoder)
}

#[tokio::test]
async fn test_read_file_from_head() {
    let (_dir, repo_path, repo) = create_test_repo();
    add_commit(&repo, &[("hello.txt", b"Hello, World!")], "Add hello.txt");

    let view = open(&repo_path);
    let file = view.get_file("HEAD", "hello.txt").await.unwrap();
    assert_eq!(file.mode, MODE_BLOB);
    assert_eq!(file.size, 13);
    assert_eq!(file.into_bytes().await.unwrap().as_ref(), b"Hello, World!");
}

#[tokio::test]
async fn test_parsed_commit_matches_libgit2() {
    let (_dir, repo_path, repo) = create_test_repo();
    let first = add_commit(&repo, &[("a.txt", b"a")], "First");
    let second = add_commit(&repo, &[("b.txt", b"b")], "Second\n\nWith a body\n");

    let view = open(&repo_path);
    let commit = view.get_commit_parsed("HEAD").await.unwrap();
    let expected = repo.find_commit(git2::Oid::from_bytes(second.as_bytes()).unwrap()).unwrap();

    assert_eq!(commit.id, second);
    assert_eq!(commit.tree, to_id(expected.tree_id()));
    assert_eq!(commit.parents, vec![first]);
    assert_eq!(commit.title, "Second");
    assert_eq!(commit.body, "Second\n\nWith a body\n");
    assert_eq!(commit.author.name, "Test User");
    assert_eq!(commit.author.email, "test@example.com");
    assert!(!commit.separate_author);

    // A message without a trailing newline comes back untouched
    let root = view.get_commit_parsed(&first.to_string()).await.unwrap();
    assert_eq!(root.body, "First");
}

#[tokio::test]
async fn test_nested_directories() {
    let (_dir, repo_path, repo) = create_test_repo();
    add_commit(
        &repo,
        &[
            ("src/main.rs", b"fn main() {}"),
            ("src/util/mod.rs", b"pub mod x;"),
            ("README.md", b"# readme"),
        ],
        "Layout",
    );

    let view = open(&repo_path);
    let root: Vec<_> = view.read_dir("HEAD", "").await.unwrap().collect().await.unwrap();
    // libgit2 writes entries in git's canonical order
    let names: Vec<&str> = root.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["README.md", "src"]);
    assert_eq!(root[1].mode, MODE_TREE);

    let util: Vec<_> = view.read_dir("HEAD", "src/util").await.unwrap().collect().await.unwrap();
    assert_eq!(util.len(), 1);
    assert_eq!(util[0].name, "mod.rs");

    assert!(matches!(view.read_dir("HEAD", "src/main.rs/x").await, Err(Error::BadPath(_))));
}

#[tokio::test]
async fn test_history_after_removal() {
    let (_dir, repo_path, repo) = create_test_repo();
    let first = add_commit(&repo, &[("keep.txt", b"keep"), ("gone.txt", b"gone")], "Add two");
    let second = remove_file_commit(&repo, "gone.txt", "Remove one");

    let view = open(&repo_path);
    let log = view.read_log("HEAD").collect().await.unwrap();
    assert_eq!(log, vec![second, first]);

    assert!(view.get_file("HEAD", "gone.txt").await.unwrap_err().is_not_found());
    let old = view.get_file(&first.to_string(), "gone.txt").await.unwrap();
    assert_eq!(old.into_bytes().await.unwrap().as_ref(), b"gone");
}

#[tokio::test]
async fn test_branch_and_annotated_tag() {
    let (_dir, repo_path, repo) = create_test_repo();
    let head = add_commit(&repo, &[("a.txt", b"a")], "Tagged");

    let target = repo.find_object(git2::Oid::from_bytes(head.as_bytes()).unwrap(), None).unwrap();
    let tagger = git2::Signature::now("Tagger", "tagger@example.com").unwrap();
    let tag = repo.tag("v1.0", &target, &tagger, "Release 1.0\n", false).unwrap();
    repo.branch("feature", &target.peel_to_commit().unwrap(), false).unwrap();

    let view = open(&repo_path);
    assert_eq!(view.resolve_ref("feature").await.unwrap(), head);
    assert_eq!(view.resolve_ref("v1.0").await.unwrap(), to_id(tag));

    let (_, commit) = view.get_commit("v1.0").await.unwrap();
    assert_eq!(commit, head);

    let fields = view.read_tag("v1.0").await.unwrap().collect().await.unwrap();
    let tag_name = fields.iter().find(|f| f.name == "tag").unwrap();
    assert_eq!(tag_name.value.as_text(), "v1.0");
}

fn pack_files(repo_path: &std::path::Path, extension: &str) -> Vec<std::path::PathBuf> {
    let pack_dir = repo_path.join(".git/objects/pack");
    std::fs::read_dir(pack_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|e| e == extension))
        .collect()
}

#[tokio::test]
async fn test_reads_through_a_libgit2_pack() {
    let (_dir, repo_path, repo) = create_test_repo();
    let original: Vec<u8> = (0..2000)
        .flat_map(|i| format!("line {} of a file big enough to be deltified\n", i).into_bytes())
        .collect();
    let mut edited = original.clone();
    edited.extend_from_slice(b"one more line\n");

    let first = add_commit(&repo, &[("big.txt", &original)], "Add big file");
    let second = add_commit(&repo, &[("big.txt", &edited)], "Grow big file");
    pack_and_prune(&repo);
    assert_eq!(pack_files(&repo_path, "pack").len(), 1);

    let view = open(&repo_path);
    let head = view.get_file("HEAD", "big.txt").await.unwrap();
    assert_eq!(head.into_bytes().await.unwrap().as_ref(), edited.as_slice());
    let old = view.get_file(&first.to_string(), "big.txt").await.unwrap();
    assert_eq!(old.into_bytes().await.unwrap().as_ref(), original.as_slice());

    assert_eq!(view.read_log("HEAD").collect().await.unwrap(), vec![second, first]);
    let location = view.find_packed_object(&second).await.unwrap();
    assert!(location.pack_id.ends_with(".pack"));
    assert!(location.offset >= 12);
}

#[tokio::test]
async fn test_unpacks_every_object_of_a_libgit2_pack() {
    let (_dir, repo_path, repo) = create_test_repo();
    add_commit(&repo, &[("a.txt", b"a"), ("dir/b.txt", b"b")], "First");
    add_commit(&repo, &[("a.txt", b"a, changed")], "Second");
    pack_and_prune(&repo);

    let view = open(&repo_path);
    let pack = pack_files(&repo_path, "pack").remove(0);
    let pack_id = pack.file_name().unwrap().to_string_lossy().into_owned();
    let unpacked = view.unpack_pack(&pack_id).await.unwrap();

    // 2 commits, 3 trees (2 roots + dir), 3 blobs
    assert_eq!(unpacked.len(), 8);
    let kinds: Vec<ObjectKind> = unpacked.iter().map(|o| o.kind).collect();
    assert_eq!(kinds.iter().filter(|k| **k == ObjectKind::Commit).count(), 2);
    assert_eq!(kinds.iter().filter(|k| **k == ObjectKind::Blob).count(), 3);
}

#[tokio::test]
async fn test_index_parser_agrees_with_gix_pack() {
    let (_dir, repo_path, repo) = create_test_repo();
    add_commit(&repo, &[("a.txt", b"a"), ("b.txt", b"b")], "First");
    add_commit(&repo, &[("c.txt", b"c")], "Second");
    pack_and_prune(&repo);

    let idx_path = pack_files(&repo_path, "idx").remove(0);
    let mut ours = parse_idx_v2(&std::fs::read(&idx_path).unwrap()).unwrap();
    ours.sort();

    let index = gix_pack::index::File::at(&idx_path, gix_hash::Kind::Sha1).unwrap();
    let mut theirs: Vec<_> = index.iter().map(|e| (e.oid, e.pack_offset)).collect();
    theirs.sort();

    assert_eq!(ours, theirs);
}

#[tokio::test]
async fn test_builder_pack_on_disk() {
    let (_dir, repo_path, _repo) = create_test_repo();
    let mut builder = PackBuilder::new();
    let id = builder.add(ObjectKind::Blob, b"only in a pack");
    let pack = builder.finish();

    let pack_dir = repo_path.join(".git/objects/pack");
    std::fs::create_dir_all(&pack_dir).unwrap();
    std::fs::write(pack_dir.join(pack.idx_id()), &pack.index).unwrap();
    std::fs::write(pack_dir.join(pack.pack_id()), &pack.pack).unwrap();

    // libgit2 accepts the pack as one of the repository's own
    let reopened = git2::Repository::open(&repo_path).unwrap();
    let blob = reopened.find_blob(git2::Oid::from_bytes(id.as_bytes()).unwrap()).unwrap();
    assert_eq!(blob.content(), b"only in a pack");

    let view = open(&repo_path);
    let location = view.find_packed_object(&id).await.unwrap();
    assert_eq!(location.pack_id, pack.pack_id());

    let object = view.get_object_from_any(&id).await.unwrap();
    assert_eq!(object.kind, ObjectKind::Blob);
    assert_eq!(object.into_bytes().await.unwrap().as_ref(), b"only in a pack");
}
