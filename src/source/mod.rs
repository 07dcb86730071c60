//! Document sources and the capabilities the query core reads through.
//!
//! The core never owns documents. It lists them, asks for term
//! frequencies and reads properties through the traits defined here:
//!
//! - [`DocumentSource`] - lists documents and counts term matches
//! - [`PropertyAccessor`] - lazily resolves `content`, `size`, `fields`
//! - [`DocumentResolver`] - folds derived or merged documents onto
//!   canonical identifiers
//!
//! Three sources ship with the crate: [`MemorySource`], [`FsSource`] and
//! [`CommandSource`].

pub mod command;
pub mod fs;
pub mod memory;

pub use command::CommandSource;
pub use fs::FsSource;
pub use memory::{MemoryDocument, MemorySource};

use crate::error::{Error, Result};
use crate::session::CancelToken;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Property names every accessor understands
pub const CONTENT: &str = "content";
pub const SIZE: &str = "size";
pub const FIELDS: &str = "fields";

/// Opaque, cheaply clonable document identifier.
///
/// Stable for the lifetime of a query session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(Arc<str>);

impl DocId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Borrow<str> for DocId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for DocId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Value of a declared metadata field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Free text, searched like content
    Text(String),
    /// One or more category labels
    Category(Vec<String>),
}

impl FieldValue {
    /// Text values of the field, one per label for categories
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        let (single, many): (Option<&str>, &[String]) = match self {
            FieldValue::Text(t) => (Some(t.as_str()), &[]),
            FieldValue::Category(labels) => (None, labels.as_slice()),
        };
        single.into_iter().chain(many.iter().map(String::as_str))
    }

    /// Length in characters, used for field-length normalization
    pub fn len(&self) -> usize {
        self.texts().map(|t| t.chars().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named metadata field on a document
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Text(text.into()),
        }
    }

    pub fn category(name: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Category(labels),
        }
    }
}

/// A resolved document property
#[derive(Debug, Clone)]
pub enum Property {
    Text(Arc<str>),
    Int(i64),
    Fields(Arc<[Field]>),
}

/// Lazily resolves document properties.
pub trait PropertyAccessor: Send + Sync {
    /// Look up a named property, `None` when absent
    fn property(&self, id: &DocId, name: &str) -> Option<Property>;

    fn content(&self, id: &DocId) -> Option<Arc<str>> {
        match self.property(id, CONTENT)? {
            Property::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Document size, falling back to the content length
    fn size(&self, id: &DocId) -> Option<u64> {
        match self.property(id, SIZE) {
            Some(Property::Int(n)) => Some(n.max(0) as u64),
            _ => self.content(id).map(|c| c.len() as u64),
        }
    }

    fn fields(&self, id: &DocId) -> Arc<[Field]> {
        match self.property(id, FIELDS) {
            Some(Property::Fields(fields)) => fields,
            _ => Arc::from(Vec::new()),
        }
    }
}

/// A single leaf search term as sent to sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermPattern {
    /// Case-insensitive literal text
    Literal(String),
    /// Regular expression, used verbatim
    Regex(String),
}

impl TermPattern {
    /// The literal regex form of the term; also the cache key
    pub fn to_regex(&self) -> String {
        match self {
            TermPattern::Literal(text) => format!("(?i){}", regex::escape(text)),
            TermPattern::Regex(pattern) => pattern.clone(),
        }
    }

    pub fn compile(&self) -> Result<Regex> {
        let pattern = self.to_regex();
        Regex::new(&pattern).map_err(|source| Error::InvalidPattern { pattern, source })
    }
}

impl fmt::Display for TermPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermPattern::Literal(text) => write!(f, "{}", text),
            TermPattern::Regex(pattern) => write!(f, "#{}", pattern),
        }
    }
}

/// Per-call context handed to sources
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// Trips when the issuing generation is superseded
    pub token: CancelToken,
}

impl SourceContext {
    pub fn new(token: CancelToken) -> Self {
        Self { token }
    }

    /// Return `Err(Cancelled)` once the issuing generation is stale
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Hash map keyed with the fast `ahash` hasher
pub type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;
pub type FastSet<K> = HashSet<K, ahash::RandomState>;

/// Raw per-document match counts reported by a source
pub type TermCounts = FastMap<DocId, u64>;

/// A producer of documents and their term statistics.
///
/// Calls are blocking; the session dispatches each one on a worker
/// thread, so from the query's point of view they are asynchronous.
/// Long-running work should poll [`SourceContext::check`].
pub trait DocumentSource: PropertyAccessor {
    /// Name used in logs and failure reports
    fn name(&self) -> &str;

    fn list_documents(&self, ctx: &SourceContext) -> Result<Vec<DocId>>;

    /// Count matches of `term` per document. Documents with no match may be
    /// omitted.
    fn term_frequency(&self, ctx: &SourceContext, term: &TermPattern) -> Result<TermCounts>;

    /// Documents containing `term` at least once
    fn term_presence(&self, ctx: &SourceContext, term: &TermPattern) -> Result<FastSet<DocId>> {
        Ok(self
            .term_frequency(ctx, term)?
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(id, _)| id)
            .collect())
    }
}

/// Outcome of resolving a reported document identifier
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The identifier is itself canonical
    Canonical,
    /// Counts belong to these canonical documents instead
    Remapped(Vec<DocId>),
    /// Not part of the session; counts are dropped
    Unknown,
}

pub trait DocumentResolver: Send + Sync {
    fn resolve(&self, id: &DocId) -> Resolution;
}

/// Count non-overlapping matches of `regex` in `text`
pub fn count_matches(regex: &Regex, text: &str) -> u64 {
    regex.find_iter(text).count() as u64
}
