//! Read-only access to git object stores
//!
//! [`Repository`] resolves refs, streams commit and tag fields, walks trees
//! by path, follows first-parent history, and serves objects from loose
//! storage or packs through memoized, single-flight caches. Storage is
//! pluggable through the traits in [`store`].

pub mod config;
pub mod error;
pub mod model;
pub mod repository;
pub mod store;
pub mod util;

pub use config::{IdField, RepositoryConfig};
pub use error::{Error, Result};
pub use repository::Repository;
