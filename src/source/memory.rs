use crate::error::Result;
use crate::source::{
    count_matches, DocId, DocumentSource, FastMap, Field, Property, PropertyAccessor,
    SourceContext, TermCounts, TermPattern, CONTENT, FIELDS, SIZE,
};
use rayon::prelude::*;
use std::sync::Arc;

/// A document held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    pub id: DocId,
    pub content: Arc<str>,
    pub fields: Arc<[Field]>,
}

impl MemoryDocument {
    pub fn new(id: impl Into<DocId>, content: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            fields: Arc::from(Vec::new()),
        }
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = Arc::from(fields);
        self
    }
}

/// Source over a fixed set of in-memory documents.
///
/// Term counting runs over all documents in parallel.
pub struct MemorySource {
    name: String,
    docs: Vec<MemoryDocument>,
    by_id: FastMap<DocId, usize>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, docs: Vec<MemoryDocument>) -> Self {
        let by_id = docs
            .iter()
            .enumerate()
            .map(|(idx, doc)| (doc.id.clone(), idx))
            .collect();
        Self {
            name: name.into(),
            docs,
            by_id,
        }
    }

    /// Build from `(id, content)` pairs
    pub fn from_texts<I, K, V>(name: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<DocId>,
        V: Into<Arc<str>>,
    {
        let docs = texts
            .into_iter()
            .map(|(id, content)| MemoryDocument::new(id, content))
            .collect();
        Self::new(name, docs)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn get(&self, id: &DocId) -> Option<&MemoryDocument> {
        self.by_id.get(id).map(|&idx| &self.docs[idx])
    }
}

impl PropertyAccessor for MemorySource {
    fn property(&self, id: &DocId, name: &str) -> Option<Property> {
        let doc = self.get(id)?;
        match name {
            CONTENT => Some(Property::Text(doc.content.clone())),
            SIZE => Some(Property::Int(doc.content.len() as i64)),
            FIELDS => Some(Property::Fields(doc.fields.clone())),
            _ => None,
        }
    }
}

impl DocumentSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_documents(&self, _ctx: &SourceContext) -> Result<Vec<DocId>> {
        Ok(self.docs.iter().map(|d| d.id.clone()).collect())
    }

    fn term_frequency(&self, ctx: &SourceContext, term: &TermPattern) -> Result<TermCounts> {
        let regex = term.compile()?;
        ctx.check()?;

        let counts: TermCounts = self
            .docs
            .par_iter()
            .filter_map(|doc| {
                let count = count_matches(&regex, &doc.content);
                (count > 0).then(|| (doc.id.clone(), count))
            })
            .collect();

        ctx.check()?;
        Ok(counts)
    }
}
