//! First-parent history walk

use gix_hash::ObjectId;
use tracing::trace;

use crate::error::{Error, Result};
use crate::model::{parse_id, Object, ObjectKind};
use crate::store::{Cursor, ObjectStore, PackDecoder};

use super::{read_header_field, Repository};

enum State {
    Start(String),
    /// The commit whose id was yielded last, not yet read for its parent
    Walk(Object),
    Done,
}

/// Commit ids from a starting ref back to the root, first parents only.
///
/// Only the commit most recently yielded is held; each step fetches the
/// next one fresh.
pub struct Log<'r, S, D> {
    repo: &'r Repository<S, D>,
    state: State,
}

impl<S: ObjectStore, D: PackDecoder> Log<'_, S, D> {
    async fn step(&mut self) -> Result<Option<ObjectId>> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Start(head) => {
                let (object, id) = self.repo.get_commit(&head).await?;
                self.state = State::Walk(object);
                Ok(Some(id))
            }
            State::Walk(object) => {
                let Some(parent) = read_header_field(object, "parent").await? else {
                    return Ok(None);
                };
                let id = parse_id(&parent)?;
                let object = self.repo.get_object_from_any(&id).await?;
                if object.kind != ObjectKind::Commit {
                    return Err(Error::UnexpectedType {
                        expected: ObjectKind::Commit,
                        actual: object.kind,
                    });
                }
                trace!(%id, "log step");
                self.state = State::Walk(object);
                Ok(Some(id))
            }
            State::Done => Ok(None),
        }
    }
}

impl<S: ObjectStore, D: PackDecoder> Cursor for Log<'_, S, D> {
    type Item = ObjectId;

    async fn next(&mut self) -> Result<Option<ObjectId>> {
        self.step().await
    }

    async fn close(&mut self) -> Result<()> {
        self.state = State::Done;
        Ok(())
    }
}

impl<S: ObjectStore, D: PackDecoder> Repository<S, D> {
    /// Walk the first-parent chain starting at `head`. Nothing is fetched
    /// until the first call to `next`.
    pub fn read_log(&self, head: &str) -> Log<'_, S, D> {
        Log {
            repo: self,
            state: State::Start(head.to_string()),
        }
    }
}
