//! BM25 and BM25F ranking.
//!
//! Turns the flattened leaves of an evaluated query into one score per
//! document:
//! - each leaf is scored with BM25 (or BM25F over declared fields)
//! - `not` leaves subtract from documents that already scored
//! - `must-not` documents are dropped, a non-empty `must` set restricts
//!
//! Corpus size and total document size are supplied by the caller.

use crate::config::RankingModel;
use crate::query::envelope::{CalcType, Leaf};
use crate::source::{count_matches, DocId, FastMap, FastSet, PropertyAccessor};
use std::collections::HashMap;
use tracing::debug;

/// Term-frequency saturation
pub const K1: f64 = 1.2;
/// Length normalization strength
pub const B: f64 = 0.75;

pub type ScoreMap = FastMap<DocId, f64>;

/// Collection-wide statistics BM25 needs
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusStats {
    pub document_count: usize,
    pub total_size: u64,
}

impl CorpusStats {
    pub fn new(document_count: usize, total_size: u64) -> Self {
        Self {
            document_count,
            total_size,
        }
    }

    pub fn avg_size(&self) -> f64 {
        if self.document_count == 0 {
            0.0
        } else {
            self.total_size as f64 / self.document_count as f64
        }
    }
}

/// Inverse document frequency; finite even when nothing matches
pub fn idf(document_count: usize, matching: usize) -> f64 {
    let n = document_count as f64;
    let m = matching as f64;
    ((n - m + 0.5) / (m + 0.5) + 1.0).ln()
}

/// Length normalization factor `1 - b + b * len / avg`
fn length_norm(len: f64, avg: f64) -> f64 {
    if avg > 0.0 {
        1.0 - B + B * len / avg
    } else {
        1.0
    }
}

/// BM25 weight of `count` matches in a document of `size`
pub fn bm25(count: f64, size: f64, avg_size: f64, idf: f64) -> f64 {
    if count <= 0.0 {
        return 0.0;
    }
    idf * count * (K1 + 1.0) / (count + K1 * length_norm(size, avg_size))
}

/// Average length of each declared field over the documents having it
#[derive(Debug, Clone, Default)]
pub struct FieldStats {
    averages: FastMap<String, f64>,
}

impl FieldStats {
    pub fn compute(accessor: &dyn PropertyAccessor, candidates: &[DocId]) -> Self {
        let mut totals: FastMap<String, (f64, usize)> = FastMap::default();
        for id in candidates {
            for field in accessor.fields(id).iter() {
                let entry = totals.entry(field.name.clone()).or_insert((0.0, 0));
                entry.0 += field.value.len() as f64;
                entry.1 += 1;
            }
        }
        let averages = totals
            .into_iter()
            .map(|(name, (sum, docs))| (name, sum / docs as f64))
            .collect();
        Self { averages }
    }

    pub fn average(&self, field: &str) -> f64 {
        self.averages.get(field).copied().unwrap_or(0.0)
    }
}

/// BM25F configuration
pub struct FieldWeighting<'a> {
    pub weights: &'a HashMap<String, f64>,
    pub stats: FieldStats,
}

impl FieldWeighting<'_> {
    fn weight(&self, field: &str) -> f64 {
        self.weights.get(field).copied().unwrap_or(1.0)
    }
}

pub struct Scorer<'a> {
    corpus: CorpusStats,
    accessor: &'a dyn PropertyAccessor,
    fields: Option<FieldWeighting<'a>>,
}

impl<'a> Scorer<'a> {
    /// Plain BM25 scorer
    pub fn new(corpus: CorpusStats, accessor: &'a dyn PropertyAccessor) -> Self {
        Self {
            corpus,
            accessor,
            fields: None,
        }
    }

    /// Scorer for the configured model
    pub fn for_model(
        model: RankingModel,
        corpus: CorpusStats,
        accessor: &'a dyn PropertyAccessor,
        weights: &'a HashMap<String, f64>,
        candidates: &[DocId],
    ) -> Self {
        let scorer = Self::new(corpus, accessor);
        match model {
            RankingModel::Bm25 => scorer,
            RankingModel::Bm25f => scorer.with_fields(FieldWeighting {
                weights,
                stats: FieldStats::compute(accessor, candidates),
            }),
        }
    }

    pub fn with_fields(mut self, fields: FieldWeighting<'a>) -> Self {
        self.fields = Some(fields);
        self
    }

    fn size_of(&self, id: &DocId) -> f64 {
        self.accessor
            .size(id)
            .map(|s| s as f64)
            .unwrap_or_else(|| self.corpus.avg_size())
    }

    /// Score one leaf; documents with non-positive counts are skipped
    pub fn score_leaf(&self, leaf: &Leaf) -> ScoreMap {
        let matching = leaf.counts.values().filter(|c| **c > 0).count();
        let idf = idf(self.corpus.document_count, matching);
        let avg_size = self.corpus.avg_size();

        let field_regex = match (&self.fields, &leaf.origin) {
            (Some(_), Some(origin)) => origin.compile().ok(),
            _ => None,
        };

        leaf.counts
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(id, &count)| {
                let score = match (&self.fields, &field_regex) {
                    (Some(fields), Some(regex)) => {
                        self.bm25f(id, count as f64, idf, avg_size, fields, regex)
                    }
                    _ => bm25(count as f64, self.size_of(id), avg_size, idf),
                };
                (id.clone(), score)
            })
            .collect()
    }

    fn bm25f(
        &self,
        id: &DocId,
        count: f64,
        idf: f64,
        avg_size: f64,
        fields: &FieldWeighting<'_>,
        regex: &regex::Regex,
    ) -> f64 {
        let mut tf = 0.0;
        let mut field_matches = 0.0;

        for field in self.accessor.fields(id).iter() {
            let matches: u64 = field.value.texts().map(|t| count_matches(regex, t)).sum();
            if matches == 0 {
                continue;
            }
            let matches = matches as f64;
            field_matches += matches;
            let norm = length_norm(field.value.len() as f64, fields.stats.average(&field.name));
            tf += fields.weight(&field.name) * matches / norm;
        }

        // Field matches were already merged into the leaf count
        let content = (count - field_matches).max(0.0);
        tf += content / length_norm(self.size_of(id), avg_size);

        if tf <= 0.0 {
            return 0.0;
        }
        idf * tf * (K1 + 1.0) / (tf + K1)
    }

    /// Combine all leaves into final document scores
    pub fn rank(&self, leaves: &[Leaf]) -> ScoreMap {
        let mut total = ScoreMap::default();
        let mut must: FastSet<DocId> = FastSet::default();
        let mut must_not: FastSet<DocId> = FastSet::default();
        let mut negations = Vec::new();

        for leaf in leaves {
            let positive = leaf.counts.iter().filter(|(_, c)| **c > 0).map(|(id, _)| id);
            match leaf.calc {
                CalcType::Must => must.extend(positive.cloned()),
                CalcType::MustNot => must_not.extend(positive.cloned()),
                CalcType::Normal | CalcType::Not => {}
            }

            let scores = self.score_leaf(leaf);
            if leaf.calc == CalcType::Not {
                negations.push((scores, leaf.boost));
                continue;
            }
            for (id, score) in scores {
                *total.entry(id).or_insert(0.0) += score * leaf.boost;
            }
        }

        // Negations never introduce candidates
        for (scores, boost) in negations {
            for (id, score) in scores {
                if let Some(value) = total.get_mut(&id) {
                    *value -= score * boost;
                }
            }
        }

        total.retain(|id, _| !must_not.contains(id));
        if !must.is_empty() {
            total.retain(|id, _| must.contains(id));
        }

        debug!(
            leaves = leaves.len(),
            scored = total.len(),
            must = must.len(),
            must_not = must_not.len(),
            "ranked query leaves"
        );
        total
    }
}
