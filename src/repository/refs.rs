//! Reference resolution
//!
//! A name resolves in this order:
//!
//! - a literal 40-hex id is returned as-is, without touching the ref source
//! - an exact ref name (`refs/heads/main`) or `refs/<name>` (`heads/main`)
//! - `<namespace><name>` for each configured namespace (`main`)
//!
//! Refs are enumerated fresh on every call and never cached.

use gix_hash::ObjectId;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{is_object_id, parse_id, Object, Reference};
use crate::store::{Cursor, ObjectStore, PackDecoder, RefStore};

use super::Repository;

impl<S: ObjectStore, D: PackDecoder> Repository<S, D> {
    /// Resolve a ref name or literal id to an object id
    pub async fn resolve_ref(&self, name: &str) -> Result<ObjectId> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty ref name".into()));
        }
        if is_object_id(name) {
            return parse_id(name);
        }

        let mut refs = self.store.refs().await?;
        let scanned = self.scan_refs(&mut refs, name).await;
        match scanned {
            Ok(found) => {
                refs.close().await?;
                let id = found.ok_or_else(|| Error::NotFound(format!("ref '{}' not found", name)))?;
                debug!(name, %id, "resolved ref");
                Ok(id)
            }
            Err(err) => {
                let _ = refs.close().await;
                Err(err)
            }
        }
    }

    async fn scan_refs(&self, refs: &mut S::Refs, name: &str) -> Result<Option<ObjectId>> {
        let prefixed = (!name.starts_with("refs/")).then(|| format!("refs/{}", name));
        let namespaces = &self.config.ref_namespaces;
        // With a single namespace a match cannot be ambiguous
        let stop_on_namespace = namespaces.len() <= 1;

        let mut namespaced: Option<Reference> = None;
        let mut ambiguous = false;

        while let Some(reference) = refs.next().await? {
            if reference.name == name || prefixed.as_deref() == Some(reference.name.as_str()) {
                return Ok(Some(reference.id));
            }

            let in_namespace = namespaces.iter().any(|ns| {
                reference
                    .name
                    .strip_prefix(ns.as_str())
                    .is_some_and(|rest| rest == name)
            });
            if !in_namespace {
                continue;
            }
            if stop_on_namespace {
                return Ok(Some(reference.id));
            }
            match &namespaced {
                Some(first) if first.name != reference.name => ambiguous = true,
                Some(_) => {}
                None => namespaced = Some(reference),
            }
        }

        if ambiguous {
            return Err(Error::NotFound(format!("ref '{}' is ambiguous", name)));
        }
        Ok(namespaced.map(|reference| reference.id))
    }

    /// Resolve `name` and fetch the object it points at
    pub async fn get_ref(&self, name: &str) -> Result<(Object, ObjectId)> {
        let id = self.resolve_ref(name).await?;
        let object = self.get_object_from_any(&id).await?;
        Ok((object, id))
    }
}
