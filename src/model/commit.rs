//! Commit and tag field types
//!
//! Commits and tags share one text encoding: header lines, a blank line,
//! then a free-text message. Parsing yields an ordered stream of [`Field`]s
//! which [`Commit::from_fields`] folds into a materialized commit.

use gix_hash::ObjectId;

use crate::error::{Error, Result};
use crate::util::{format_timestamp, format_timestamp_with_offset};

use super::object::parse_id;

/// A person plus timestamp, as found on `author`, `committer` and `tagger` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The line value exactly as stored
    pub raw: String,
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Timezone offset as written, e.g. `+0200`
    pub offset: String,
}

impl Identity {
    /// Parse `name <email> epoch-seconds timezone`.
    ///
    /// Parsing is lenient: pieces that cannot be found are left empty (or 0),
    /// `raw` always holds the original text.
    pub fn parse(raw: &str) -> Self {
        let mut identity = Identity {
            raw: raw.to_string(),
            name: String::new(),
            email: String::new(),
            timestamp: 0,
            offset: String::new(),
        };

        let (Some(open), Some(close)) = (raw.find('<'), raw.rfind('>')) else {
            identity.name = raw.trim().to_string();
            return identity;
        };
        if close < open {
            identity.name = raw.trim().to_string();
            return identity;
        }

        identity.name = raw[..open].trim().to_string();
        identity.email = raw[open + 1..close].to_string();

        let mut rest = raw[close + 1..].split_whitespace();
        if let Some(ts) = rest.next() {
            identity.timestamp = ts.parse().unwrap_or(0);
        }
        if let Some(tz) = rest.next() {
            identity.offset = tz.to_string();
        }
        identity
    }

    /// Same person (name and email), ignoring the timestamp
    pub fn same_person(&self, other: &Identity) -> bool {
        self.name == other.name && self.email == other.email
    }

    /// Same point in time, written with the same offset
    pub fn same_date(&self, other: &Identity) -> bool {
        self.timestamp == other.timestamp && self.offset == other.offset
    }

    /// Date as `YYYY-MM-DD` (UTC)
    pub fn date(&self) -> String {
        format_timestamp(self.timestamp)
    }

    /// Date and time in the author's own timezone
    pub fn local_date(&self) -> String {
        format_timestamp_with_offset(self.timestamp, &self.offset)
    }
}

/// Value of a commit/tag field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Identity(Identity),
    Id(ObjectId),
}

impl FieldValue {
    /// The textual form of this value
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            FieldValue::Text(s) => s.as_str().into(),
            FieldValue::Identity(identity) => identity.raw.as_str().into(),
            FieldValue::Id(id) => id.to_string().into(),
        }
    }
}

/// One named field of a commit or tag, in encounter order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Text(value.into()),
        }
    }

    /// Build a header field, structuring identity lines
    pub fn header(name: &str, value: &str) -> Self {
        let value = match name {
            "author" | "committer" | "tagger" => FieldValue::Identity(Identity::parse(value)),
            _ => FieldValue::Text(value.to_string()),
        };
        Self {
            name: name.to_string(),
            value,
        }
    }

    pub fn id(id: ObjectId) -> Self {
        Self {
            name: "id".to_string(),
            value: FieldValue::Id(id),
        }
    }
}

/// A materialized commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: ObjectId,
    pub tree: ObjectId,
    /// Parents in encounter order, first parent first
    pub parents: Vec<ObjectId>,
    pub author: Identity,
    pub committer: Identity,
    pub title: String,
    /// Full message, title line included
    pub body: String,
    /// Author and committer are different people
    pub separate_author: bool,
    /// Authored and committed at different times
    pub separate_author_date: bool,
}

impl Commit {
    /// Fold a complete field sequence into a commit
    pub fn from_fields(fields: impl IntoIterator<Item = Field>) -> Result<Self> {
        let mut id = None;
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut title = String::new();
        let mut body = String::new();

        for field in fields {
            match (field.name.as_str(), field.value) {
                ("id", FieldValue::Id(value)) => id = Some(value),
                ("tree", value) => tree = Some(parse_id(&value.as_text())?),
                ("parent", value) => parents.push(parse_id(&value.as_text())?),
                ("author", FieldValue::Identity(value)) => author = Some(value),
                ("committer", FieldValue::Identity(value)) => committer = Some(value),
                ("title", value) => title = value.as_text().into_owned(),
                ("body", value) => body = value.as_text().into_owned(),
                _ => {}
            }
        }

        let missing = |what: &str| Error::MalformedObject(format!("commit has no {} field", what));
        let author = author.ok_or_else(|| missing("author"))?;
        let committer = committer.ok_or_else(|| missing("committer"))?;

        Ok(Commit {
            id: id.ok_or_else(|| missing("id"))?,
            tree: tree.ok_or_else(|| missing("tree"))?,
            parents,
            separate_author: !author.same_person(&committer),
            separate_author_date: !author.same_date(&committer),
            author,
            committer,
            title,
            body,
        })
    }
}
