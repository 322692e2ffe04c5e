// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use gitview::model::{encode_tree, hash_object, ObjectKind, TreeEntry, MODE_BLOB, MODE_TREE};
use gitview::store::{MemoryStore, PackBuilder};
use gix_hash::ObjectId;

/// Encoded content of a flat tree with `num_entries` files
pub fn generate_tree(num_entries: usize) -> Vec<u8> {
    let entries: Vec<TreeEntry> = (0..num_entries)
        .map(|i| {
            let name = format!("file_{:06}.rs", i);
            let id = hash_object(ObjectKind::Blob, name.as_bytes());
            TreeEntry::new(name, MODE_BLOB, id)
        })
        .collect();
    encode_tree(&entries)
}

/// Store a chain of `depth` nested directories, each padded with `width`
/// sibling files ahead of the subdirectory. Returns the root tree id and the
/// path of the innermost file.
pub fn generate_deep_store(store: &MemoryStore, depth: usize, width: usize) -> (ObjectId, String) {
    let leaf = store.add_object(ObjectKind::Blob, b"leaf".to_vec());
    let mut tree = store.add_object(
        ObjectKind::Tree,
        encode_tree(&[TreeEntry::new("leaf.txt", MODE_BLOB, leaf)]),
    );

    let mut path = vec!["leaf.txt".to_string()];
    for level in (0..depth).rev() {
        let dir = format!("dir_{}", level);
        let mut entries: Vec<TreeEntry> = (0..width)
            .map(|i| TreeEntry::new(format!("a_{:04}.rs", i), MODE_BLOB, leaf))
            .collect();
        entries.push(TreeEntry::new(dir.clone(), MODE_TREE, tree));
        tree = store.add_object(ObjectKind::Tree, encode_tree(&entries));
        path.insert(0, dir);
    }
    (tree, path.join("/"))
}

/// Store a pack of `num_objects` blobs and return their ids
pub fn generate_pack(store: &MemoryStore, num_objects: usize) -> Vec<ObjectId> {
    let mut builder = PackBuilder::new();
    for i in 0..num_objects {
        let content = format!("// File {}\nfn func_{}() {{}}\n", i, i);
        builder.add(ObjectKind::Blob, content.as_bytes());
    }
    let pack = builder.finish();
    store.add_pack(&pack);
    pack.ids
}
