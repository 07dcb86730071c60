//! Metadata envelope around intermediate results.
//!
//! Every operator returns a [`Tagged`] value: a term map (or an ordered
//! list of tagged children) plus boost and calc-type tags. Tags only ever
//! accumulate on the way up: a boost multiplies, a calc type is set only
//! when no child set one already.

use crate::source::{DocId, FastMap, TermPattern};

/// Signed per-document counts; subtraction may drive them negative
pub type TermMap = FastMap<DocId, i64>;

/// How a leaf contributes at ranking time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalcType {
    #[default]
    Normal,
    /// Subtract the score, candidates unchanged
    Not,
    /// Restrict results to these documents
    Must,
    /// Remove these documents
    MustNot,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Single(TermMap),
    Multi(Vec<Tagged>),
}

#[derive(Debug, Clone)]
pub struct Tagged {
    pub payload: Payload,
    pub boost: f64,
    pub calc: Option<CalcType>,
    /// Leaf pattern the counts came from, when there is exactly one
    pub origin: Option<TermPattern>,
}

/// A flattened leaf, ready for scoring
#[derive(Debug, Clone)]
pub struct Leaf {
    pub counts: TermMap,
    pub boost: f64,
    pub calc: CalcType,
    pub origin: Option<TermPattern>,
}

impl Tagged {
    pub fn single(counts: TermMap) -> Self {
        Self {
            payload: Payload::Single(counts),
            boost: 1.0,
            calc: None,
            origin: None,
        }
    }

    pub fn multi(children: Vec<Tagged>) -> Self {
        Self {
            payload: Payload::Multi(children),
            boost: 1.0,
            calc: None,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: TermPattern) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Set the calc type unless one is already present
    pub fn with_calc(mut self, calc: CalcType) -> Self {
        self.calc.get_or_insert(calc);
        self
    }

    pub fn boosted(mut self, factor: f64) -> Self {
        self.boost *= factor;
        self
    }

    /// Peel one level of grouping off a single-element list
    pub fn unwrap_single(self) -> Self {
        match self.payload {
            Payload::Multi(mut children) if children.len() == 1 => {
                let child = children.remove(0);
                let boost = self.boost;
                let calc = self.calc;
                let mut child = child.boosted(boost);
                if child.calc.is_none() {
                    child.calc = calc;
                }
                child
            }
            payload => Self { payload, ..self },
        }
    }

    /// Sum of counts across every leaf, keeping positive totals only
    pub fn collapse(&self) -> TermMap {
        match &self.payload {
            Payload::Single(counts) => counts
                .iter()
                .filter(|(_, c)| **c > 0)
                .map(|(id, c)| (id.clone(), *c))
                .collect(),
            Payload::Multi(children) => {
                let mut total = TermMap::default();
                for child in children {
                    for (id, count) in child.collapse() {
                        *total.entry(id).or_insert(0) += count;
                    }
                }
                total.retain(|_, c| *c > 0);
                total
            }
        }
    }

    /// Documents with a positive count anywhere in the tree
    pub fn documents(&self) -> Vec<DocId> {
        self.collapse().into_keys().collect()
    }

    /// Keep only documents accepted by `keep`, in every leaf map
    pub fn retain_documents(&mut self, keep: &dyn Fn(&DocId) -> bool) {
        match &mut self.payload {
            Payload::Single(counts) => counts.retain(|id, _| keep(id)),
            Payload::Multi(children) => {
                for child in children {
                    child.retain_documents(keep);
                }
            }
        }
    }

    /// Flatten into leaves, pushing boosts and calc types down
    pub fn flatten(self) -> Vec<Leaf> {
        let mut leaves = Vec::new();
        self.flatten_into(1.0, None, &mut leaves);
        leaves
    }

    fn flatten_into(self, boost: f64, inherited: Option<CalcType>, out: &mut Vec<Leaf>) {
        let boost = boost * self.boost;
        let calc = self.calc.or(inherited);
        match self.payload {
            Payload::Single(counts) => out.push(Leaf {
                counts,
                boost,
                calc: calc.unwrap_or_default(),
                origin: self.origin,
            }),
            Payload::Multi(children) => {
                for child in children {
                    child.flatten_into(boost, calc, out);
                }
            }
        }
    }
}
