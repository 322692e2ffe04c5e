//! Error types for repository access

use thiserror::Error;

use crate::model::ObjectKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Expected {expected}, got {actual}")]
    UnexpectedType {
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("Bad path: {0}")]
    BadPath(String),

    #[error("Malformed object: {0}")]
    MalformedObject(String),

    #[error("{object} is too large ({size} bytes, limit {limit})")]
    ObjectTooLarge { object: String, size: u64, limit: u64 },

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means "absent" (ref, path, file or object)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Map truncated reads to a shape violation, leaving other I/O errors intact
    pub(crate) fn truncated(err: std::io::Error, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::MalformedObject(format!("{} truncated", what))
        } else {
            Error::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
