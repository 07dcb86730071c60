use crate::source::DocId;
use serde::Serialize;
use std::cmp::Ordering;

/// A document and its posterior probability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDocument {
    pub id: DocId,
    pub probability: f64,
}

impl RankedDocument {
    pub fn new(id: DocId, probability: f64) -> Self {
        Self { id, probability }
    }
}

/// Result order: higher probability first, ties by id descending
pub fn rank_order(a: &RankedDocument, b: &RankedDocument) -> Ordering {
    b.probability
        .partial_cmp(&a.probability)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.id.cmp(&a.id))
}

/// Fixed-capacity selection of the best documents seen so far.
/// Entries stay sorted best-first; inserting shifts weaker ones down and
/// drops whatever falls off the end.
#[derive(Debug, Clone)]
pub struct TopN {
    entries: Vec<RankedDocument>,
    capacity: usize,
}

impl TopN {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The weakest kept entry once full; anything new must beat it
    #[inline]
    pub fn threshold(&self) -> Option<&RankedDocument> {
        if self.is_full() {
            self.entries.last()
        } else {
            None
        }
    }

    /// Check if a document could enter the selection
    #[inline]
    pub fn would_enter(&self, candidate: &RankedDocument) -> bool {
        if self.capacity == 0 {
            return false;
        }
        match self.threshold() {
            Some(weakest) => rank_order(candidate, weakest) == Ordering::Less,
            None => true,
        }
    }

    /// Try to insert a document. Returns true if it was kept.
    pub fn try_insert(&mut self, entry: RankedDocument) -> bool {
        if !self.would_enter(&entry) {
            return false;
        }
        let pos = self
            .entries
            .partition_point(|e| rank_order(e, &entry) != Ordering::Greater);
        self.entries.insert(pos, entry);
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Entries, best first
    pub fn entries(&self) -> &[RankedDocument] {
        &self.entries
    }
}
