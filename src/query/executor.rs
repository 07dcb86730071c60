use crate::error::{Error, Result};
use crate::query::envelope::{CalcType, Payload, Tagged, TermMap};
use crate::query::near::NearMatcher;
use crate::query::parser::QueryNode;
use crate::session::CancelToken;
use crate::source::{DocId, FastMap, FastSet, PropertyAccessor, TermCounts, TermPattern};
use rayon::prelude::*;

/// Everything the combinators need once leaf counts are gathered
pub struct ExecContext<'a> {
    /// Gathered counts per leaf pattern
    pub counts: &'a FastMap<TermPattern, TermCounts>,
    /// Content access for proximity scans
    pub accessor: &'a dyn PropertyAccessor,
    pub near_distance: usize,
    pub token: &'a CancelToken,
}

/// Evaluates an expanded query tree over gathered leaf counts
pub struct QueryExecutor<'a> {
    ctx: ExecContext<'a>,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(ctx: ExecContext<'a>) -> Self {
        Self { ctx }
    }

    /// Evaluate a node into its tagged result
    pub fn evaluate(&self, node: &QueryNode) -> Result<Tagged> {
        if self.ctx.token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match node {
            QueryNode::Term(text) | QueryNode::Phrase(text) => {
                Ok(self.leaf(TermPattern::Literal(text.clone())))
            }
            QueryNode::RegexTerm(pattern) => Ok(self.leaf(TermPattern::Regex(pattern.clone()))),
            QueryNode::Terms(children) => {
                let results = children
                    .iter()
                    .map(|child| self.evaluate(child))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Tagged::multi(results))
            }
            QueryNode::And(children) => self.and(children),
            QueryNode::Near(children) => self.near(children),
            QueryNode::Not(child) => Ok(self.evaluate(child)?.with_calc(CalcType::Not)),
            QueryNode::Must(child) => Ok(self
                .evaluate(child)?
                .unwrap_single()
                .with_calc(CalcType::Must)),
            QueryNode::MustNot(child) => Ok(self.evaluate(child)?.with_calc(CalcType::MustNot)),
            QueryNode::Boost(child, factor) => Ok(self.evaluate(child)?.boosted(*factor)),
            QueryNode::Subtract(general, specific) => self.subtract(general, specific),
        }
    }

    fn leaf(&self, pattern: TermPattern) -> Tagged {
        let counts: TermMap = self
            .ctx
            .counts
            .get(&pattern)
            .map(|counts| {
                counts
                    .iter()
                    .map(|(id, c)| (id.clone(), i64::try_from(*c).unwrap_or(i64::MAX)))
                    .collect()
            })
            .unwrap_or_default();
        Tagged::single(counts).with_origin(pattern)
    }

    /// Documents in every child, each at its weakest count
    fn and(&self, children: &[QueryNode]) -> Result<Tagged> {
        let maps = children
            .iter()
            .map(|child| Ok(self.evaluate(child)?.collapse()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tagged::single(intersect(maps)))
    }

    fn near(&self, children: &[QueryNode]) -> Result<Tagged> {
        let mut results = children
            .iter()
            .map(|child| self.evaluate(child))
            .collect::<Result<Vec<_>>>()?;

        if results.len() == 1 {
            return Ok(results.remove(0));
        }

        let candidates: Vec<DocId> = intersect(results.iter().map(Tagged::collapse).collect())
            .into_keys()
            .collect();
        let matcher = NearMatcher::new(children, self.ctx.near_distance)?;

        let qualifying: FastSet<DocId> = candidates
            .into_par_iter()
            .filter(|id| {
                !self.ctx.token.is_cancelled()
                    && self
                        .ctx
                        .accessor
                        .content(id)
                        .map(|content| matcher.qualifies(&content))
                        .unwrap_or(false)
            })
            .collect();

        if self.ctx.token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut tagged = Tagged::multi(results);
        tagged.retain_documents(&|id| qualifying.contains(id));
        Ok(tagged)
    }

    /// `general` minus `specific` over `general`'s documents
    fn subtract(&self, general: &QueryNode, specific: &QueryNode) -> Result<Tagged> {
        let specific = self.evaluate(specific)?.collapse();
        let mut general = self.evaluate(general)?;

        let mut counts = match std::mem::replace(&mut general.payload, Payload::Multi(Vec::new())) {
            Payload::Single(counts) => counts,
            Payload::Multi(children) => Tagged::multi(children).collapse(),
        };
        for (id, count) in counts.iter_mut() {
            if let Some(less) = specific.get(id) {
                *count -= less;
            }
        }

        general.payload = Payload::Single(counts);
        Ok(general)
    }
}

/// Keys present in every map, each mapped to its minimum count
pub fn intersect(maps: Vec<TermMap>) -> TermMap {
    let mut iter = maps.into_iter();
    let Some(mut result) = iter.next() else {
        return TermMap::default();
    };
    for other in iter {
        result.retain(|id, count| match other.get(id) {
            Some(theirs) => {
                *count = (*count).min(*theirs);
                true
            }
            None => false,
        });
    }
    result
}

/// Every leaf pattern that must be counted to evaluate `node`
pub fn leaf_patterns(node: &QueryNode) -> Vec<TermPattern> {
    let mut out = Vec::new();
    collect_leaves(node, &mut out);
    out
}

fn collect_leaves(node: &QueryNode, out: &mut Vec<TermPattern>) {
    let pattern = match node {
        QueryNode::Term(text) | QueryNode::Phrase(text) => TermPattern::Literal(text.clone()),
        QueryNode::RegexTerm(pattern) => TermPattern::Regex(pattern.clone()),
        QueryNode::Terms(children) | QueryNode::And(children) | QueryNode::Near(children) => {
            for child in children {
                collect_leaves(child, out);
            }
            return;
        }
        QueryNode::Not(child)
        | QueryNode::Must(child)
        | QueryNode::MustNot(child)
        | QueryNode::Boost(child, _) => {
            collect_leaves(child, out);
            return;
        }
        QueryNode::Subtract(general, specific) => {
            collect_leaves(specific, out);
            collect_leaves(general, out);
            return;
        }
    };
    if !out.contains(&pattern) {
        out.push(pattern);
    }
}
