mod commit;
mod object;
mod reference;
mod tree;

pub use commit::{Commit, Field, FieldValue, Identity};
pub use object::{
    hash_object, id_from_bytes, object_header, parse_id, CachedObject, Object, ObjectKind,
    ObjectReader,
};
pub(crate) use object::id_from_digest;
pub use reference::{is_object_id, Reference};
pub use tree::{
    encode_tree, split_path, TreeEntry, MODE_BLOB, MODE_BLOB_EXECUTABLE, MODE_COMMIT, MODE_SYMLINK,
    MODE_TREE, MODE_TYPE_MASK,
};
