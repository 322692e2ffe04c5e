use gix_hash::ObjectId;

/// File-type bits of a tree entry mode
pub const MODE_TYPE_MASK: u32 = 0o170000;
/// Subtree (directory) entry
pub const MODE_TREE: u32 = 0o040000;
/// Regular file
pub const MODE_BLOB: u32 = 0o100644;
/// Executable file
pub const MODE_BLOB_EXECUTABLE: u32 = 0o100755;
/// Symbolic link
pub const MODE_SYMLINK: u32 = 0o120000;
/// Submodule commit
pub const MODE_COMMIT: u32 = 0o160000;

/// One entry of a tree object, in on-disk order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: u32,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, mode: u32, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            mode,
            id,
        }
    }

    /// Whether this entry names a subtree
    #[inline]
    pub fn is_tree(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_TREE
    }

    /// Whether this entry names a regular or executable file
    #[inline]
    pub fn is_blob(&self) -> bool {
        self.mode & MODE_TYPE_MASK == 0o100000
    }

    /// Encode this entry the way git stores it inside a tree object
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("{:o} {}", self.mode, self.name).as_bytes());
        out.push(0);
        out.extend_from_slice(self.id.as_bytes());
    }
}

/// Encode a list of entries as tree object content
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 48);
    for entry in entries {
        entry.encode_into(&mut out);
    }
    out
}

/// Split a slash-separated path into segments, collapsing repeated slashes
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{hash_object, ObjectKind};

    #[test]
    fn test_mode_predicates() {
        let id = hash_object(ObjectKind::Blob, b"");
        assert!(TreeEntry::new("src", MODE_TREE, id).is_tree());
        assert!(TreeEntry::new("a.txt", MODE_BLOB, id).is_blob());
        assert!(TreeEntry::new("run.sh", MODE_BLOB_EXECUTABLE, id).is_blob());
        assert!(!TreeEntry::new("link", MODE_SYMLINK, id).is_blob());
        assert!(!TreeEntry::new("sub", MODE_COMMIT, id).is_tree());
    }

    #[test]
    fn test_encode_uses_git_mode_spelling() {
        let id = hash_object(ObjectKind::Blob, b"");
        let mut out = Vec::new();
        TreeEntry::new("dir", MODE_TREE, id).encode_into(&mut out);
        assert!(out.starts_with(b"40000 dir\0"));
        assert_eq!(out.len(), b"40000 dir\0".len() + 20);
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("a//b/c/"), vec!["a", "b", "c"]);
        assert_eq!(split_path("/"), Vec::<&str>::new());
        assert!(split_path("").is_empty());
    }
}
