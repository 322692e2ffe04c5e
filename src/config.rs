//! Repository configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default ceiling on decoded pack objects: 256 MiB
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 256 * 1024 * 1024;

/// Default bound on delta chains, the depth `git gc --aggressive` packs to
pub const DEFAULT_MAX_DELTA_DEPTH: usize = 250;

/// Where the synthetic `id` field appears in a commit/tag field stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdField {
    /// First field, taken from the id the caller looked the object up by
    #[default]
    Leading,
    /// Last field, computed by hashing the object bytes as they are parsed
    Trailing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Packed objects declaring a larger size fail with `ObjectTooLarge`
    pub max_object_size: u64,
    /// Longer delta chains (or cycles) fail with `MalformedObject`
    pub max_delta_depth: usize,
    pub id_field: IdField,
    /// Prefixes tried, in order, when resolving a bare ref name
    pub ref_namespaces: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            max_delta_depth: DEFAULT_MAX_DELTA_DEPTH,
            id_field: IdField::Leading,
            ref_namespaces: vec!["refs/heads/".to_string(), "refs/tags/".to_string()],
        }
    }
}

impl RepositoryConfig {
    /// Load configuration from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidArgument(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Only consult `refs/heads/` for bare names
    pub fn heads_only(mut self) -> Self {
        self.ref_namespaces = vec!["refs/heads/".to_string()];
        self
    }

    pub fn with_id_field(mut self, id_field: IdField) -> Self {
        self.id_field = id_field;
        self
    }

    pub fn with_max_object_size(mut self, max_object_size: u64) -> Self {
        self.max_object_size = max_object_size;
        self
    }

    pub fn with_max_delta_depth(mut self, max_delta_depth: usize) -> Self {
        self.max_delta_depth = max_delta_depth;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.ref_namespaces.iter().any(|ns| !ns.ends_with('/')) {
            return Err(Error::InvalidArgument(
                "ref namespaces must end with '/'".to_string(),
            ));
        }
        Ok(())
    }
}
