//! Streaming commit/tag parser
//!
//! The parser is a small state machine over the object's lines:
//!
//! - **Fields**: one header per line (`name value`), folded with any
//!   space-prefixed continuation lines, until a blank line
//! - **Title**: exactly one line, the first line of the message
//! - **Body**: the rest of the object, verbatim
//!
//! The message policy is deterministic: `title` is the first message line
//! and `body` is the whole message starting at that line, with every blank
//! line preserved. The synthetic `id` field comes first or last depending on
//! [`IdField`].

use gix_hash::ObjectId;
use sha1::{Digest, Sha1};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, ReadBuf};

use crate::config::IdField;
use crate::error::{Error, Result};
use crate::model::{id_from_digest, object_header, Commit, Field, Object, ObjectKind, ObjectReader};
use crate::store::{Cursor, ObjectStore, PackDecoder};

use super::Repository;

/// Passes bytes through while feeding them to a SHA-1 hasher
struct HashingReader {
    inner: ObjectReader,
    hasher: Option<Sha1>,
}

impl HashingReader {
    fn new(object: Object, hash: bool) -> Self {
        let hasher = hash.then(|| {
            let mut hasher = Sha1::new();
            hasher.update(object_header(object.kind, object.size));
            hasher
        });
        Self {
            inner: object.content,
            hasher,
        }
    }

    fn finish(self) -> Option<ObjectId> {
        self.hasher.map(|hasher| id_from_digest(&hasher.finalize()))
    }
}

impl AsyncRead for HashingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let (Poll::Ready(Ok(())), Some(hasher)) = (&poll, this.hasher.as_mut()) {
            hasher.update(&buf.filled()[before..]);
        }
        poll
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LeadingId(ObjectId),
    Fields,
    Title,
    Body,
    TrailingId,
    Done,
}

/// Ordered, forward-only stream of a commit's or tag's fields
pub struct CommitFields {
    reader: Option<BufReader<HashingReader>>,
    state: State,
    trailing_id: bool,
    kind: ObjectKind,
    /// The raw title line, kept so the body can start with it
    message: String,
    line: Vec<u8>,
    /// Whether the last line read ended with a newline
    terminated: bool,
}

impl CommitFields {
    /// Parse `object`, known to have id `id`
    pub fn new(object: Object, id: ObjectId, id_field: IdField) -> Self {
        let kind = object.kind;
        let trailing = id_field == IdField::Trailing;
        Self {
            reader: Some(BufReader::new(HashingReader::new(object, trailing))),
            state: if trailing { State::Fields } else { State::LeadingId(id) },
            trailing_id: trailing,
            kind,
            message: String::new(),
            line: Vec::new(),
            terminated: false,
        }
    }

    /// Read one line into `self.line` (newline stripped); false at end of stream
    async fn read_line(&mut self, what: &str) -> Result<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        self.line.clear();
        let n = reader
            .read_until(b'\n', &mut self.line)
            .await
            .map_err(|e| Error::truncated(e, what))?;
        if n == 0 {
            return Ok(false);
        }
        self.terminated = self.line.last() == Some(&b'\n');
        if self.terminated {
            self.line.pop();
        }
        Ok(true)
    }

    /// Whether the next line continues the current header (starts with a space)
    async fn continues(&mut self) -> Result<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        let buf = reader.fill_buf().await?;
        Ok(buf.first() == Some(&b' '))
    }

    async fn step(&mut self) -> Result<Option<Field>> {
        loop {
            match self.state {
                State::LeadingId(id) => {
                    self.state = State::Fields;
                    return Ok(Some(Field::id(id)));
                }
                State::Fields => {
                    if !self.read_line("commit header").await? {
                        return Err(Error::MalformedObject(format!(
                            "{} ended inside its header",
                            self.kind
                        )));
                    }
                    if self.line.is_empty() {
                        self.state = State::Title;
                        continue;
                    }

                    let line = String::from_utf8_lossy(&self.line).into_owned();
                    let (name, first) = line.split_once(' ').unwrap_or((line.as_str(), ""));
                    let mut value = first.to_string();
                    while self.continues().await? {
                        self.read_line("commit header").await?;
                        value.push('\n');
                        value.push_str(&String::from_utf8_lossy(&self.line[1..]));
                    }
                    return Ok(Some(Field::header(name, &value)));
                }
                State::Title => {
                    if !self.read_line("commit message").await? {
                        return Err(Error::MalformedObject(format!(
                            "{} has no message line",
                            self.kind
                        )));
                    }
                    let title = String::from_utf8_lossy(&self.line).into_owned();
                    self.message.push_str(&title);
                    if self.terminated {
                        self.message.push('\n');
                    }
                    self.state = State::Body;
                    return Ok(Some(Field::text("title", title)));
                }
                State::Body => {
                    let mut rest = Vec::new();
                    if let Some(reader) = self.reader.as_mut() {
                        reader.read_to_end(&mut rest).await?;
                    }
                    let mut body = std::mem::take(&mut self.message);
                    body.push_str(&String::from_utf8_lossy(&rest));
                    if self.trailing_id {
                        self.state = State::TrailingId;
                    } else {
                        self.state = State::Done;
                        self.reader = None;
                    }
                    return Ok(Some(Field::text("body", body)));
                }
                State::TrailingId => {
                    self.state = State::Done;
                    let id = self
                        .reader
                        .take()
                        .and_then(|reader| reader.into_inner().finish());
                    return Ok(id.map(Field::id));
                }
                State::Done => return Ok(None),
            }
        }
    }
}

impl Cursor for CommitFields {
    type Item = Field;

    async fn next(&mut self) -> Result<Option<Field>> {
        let result = self.step().await;
        if result.is_err() {
            self.state = State::Done;
            self.reader = None;
        }
        result
    }

    async fn close(&mut self) -> Result<()> {
        self.state = State::Done;
        self.reader = None;
        Ok(())
    }
}

/// Scan a commit or tag header for the first `name` field, releasing the
/// object as soon as it is found. `None` if the header has no such field.
pub async fn read_header_field(object: Object, name: &str) -> Result<Option<String>> {
    let mut reader = BufReader::new(object.content);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| Error::truncated(e, "header"))?;
        if n == 0 || line == b"\n" {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches('\n');
        if let Some((field, value)) = text.split_once(' ') {
            if field == name {
                return Ok(Some(value.to_string()));
            }
        }
    }
}

impl<S: ObjectStore, D: PackDecoder> Repository<S, D> {
    /// Stream the fields of the commit `rev` peels to
    pub async fn read_commit(&self, rev: &str) -> Result<CommitFields> {
        let (object, id) = self.get_commit(rev).await?;
        Ok(CommitFields::new(object, id, self.config.id_field))
    }

    /// Stream the fields of the tag object `rev` names
    pub async fn read_tag(&self, rev: &str) -> Result<CommitFields> {
        let (object, id) = self.get_ref(rev).await?;
        if object.kind != ObjectKind::Tag {
            return Err(Error::UnexpectedType {
                expected: ObjectKind::Tag,
                actual: object.kind,
            });
        }
        Ok(CommitFields::new(object, id, self.config.id_field))
    }

    /// Parse the commit `rev` peels to into a [`Commit`]
    pub async fn get_commit_parsed(&self, rev: &str) -> Result<Commit> {
        let mut fields = self.read_commit(rev).await?;
        let collected = fields.collect().await?;
        Commit::from_fields(collected)
    }
}
