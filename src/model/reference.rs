use gix_hash::ObjectId;

/// A named pointer to an object, e.g. `refs/heads/main`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub id: ObjectId,
}

impl Reference {
    pub fn new(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

/// Whether `name` is a literal object id rather than a symbolic name.
///
/// Only full 40-character lowercase hex ids qualify.
pub fn is_object_id(name: &str) -> bool {
    name.len() == 40 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
