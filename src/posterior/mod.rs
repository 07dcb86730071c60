//! Posterior engine.
//!
//! A document's posterior is the product of every prior's
//! importance-transformed score, times an observation multiplier. One
//! linear pass over the candidates sums the marginal and fills a
//! fixed-size [`TopN`]; only paging past the first page pays for a full
//! sort.

pub mod beta;
pub mod topn;

pub use topn::{rank_order, RankedDocument, TopN};

use crate::config::PosteriorConfig;
use crate::error::{Error, Result};
use crate::query::ProbabilityMap;
use crate::source::{DocId, FastMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Probability meaning "no information"
pub const NO_INFORMATION: f64 = 0.5;

/// How strongly a prior influences the posterior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// Ignored entirely
    None,
    /// Flattened toward 0.5
    Low,
    /// Used as is
    #[default]
    Medium,
    /// Sharpened toward 0 and 1
    High,
    /// Near-binary
    Critical,
    /// Binary; documents below 0.5 are excluded
    Filter,
}

impl FromStr for Importance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Importance::None),
            "low" => Ok(Importance::Low),
            "medium" => Ok(Importance::Medium),
            "high" => Ok(Importance::High),
            "critical" => Ok(Importance::Critical),
            "filter" => Ok(Importance::Filter),
            other => Err(Error::Config(format!("unknown importance `{}`", other))),
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Importance::None => "none",
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
            Importance::Critical => "critical",
            Importance::Filter => "filter",
        };
        f.write_str(name)
    }
}

fn collapse(p: f64, above: f64, below: f64) -> f64 {
    if p > NO_INFORMATION {
        above
    } else if p < NO_INFORMATION {
        below
    } else {
        NO_INFORMATION
    }
}

/// Importance-dependent remapping of a probability
pub fn transform(p: f64, importance: Importance) -> f64 {
    let p = p.clamp(0.0, 1.0);
    match importance {
        Importance::None => NO_INFORMATION,
        Importance::Low => beta::low_table().lookup(p),
        Importance::Medium => p,
        Importance::High => beta::high_table().lookup(p),
        Importance::Critical => collapse(p, 0.999, 0.001),
        Importance::Filter => collapse(p, 1.0, 0.0),
    }
}

/// An independent belief about document relevance
#[derive(Debug, Clone)]
pub struct Prior {
    pub id: String,
    pub scores: FastMap<DocId, f64>,
    /// Score for unlisted documents; `None` means no information
    pub default: Option<f64>,
    pub importance: Importance,
    /// Use `1 - p` instead of `p`
    pub complement: bool,
}

impl Prior {
    pub fn new(id: impl Into<String>, scores: FastMap<DocId, f64>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::MissingArgument("prior id"));
        }
        Ok(Self {
            id,
            scores,
            default: None,
            importance: Importance::Medium,
            complement: false,
        })
    }

    /// Prior carrying a query's probabilities, default included
    pub fn from_probabilities(id: impl Into<String>, probabilities: ProbabilityMap) -> Result<Self> {
        let default = probabilities.default;
        Ok(Self::new(id, probabilities.values)?.with_default(default))
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn complemented(mut self, complement: bool) -> Self {
        self.complement = complement;
        self
    }

    /// Raw score for `doc`, before the importance transform
    pub fn score(&self, doc: &DocId) -> f64 {
        let p = self
            .scores
            .get(doc)
            .copied()
            .or(self.default)
            .unwrap_or(NO_INFORMATION);
        if self.complement {
            1.0 - p
        } else {
            p
        }
    }

    pub fn factor(&self, doc: &DocId) -> f64 {
        transform(self.score(doc), self.importance)
    }
}

/// Result of one ranking pass
#[derive(Debug, Clone)]
pub struct Ranking {
    top: TopN,
    /// Every ranked document, unsorted until a later page is requested
    scored: Vec<RankedDocument>,
    sorted: Option<Vec<RankedDocument>>,
    /// Sum of all posteriors
    pub marginal: f64,
}

impl Ranking {
    /// Number of ranked documents
    pub fn total(&self) -> usize {
        self.sorted
            .as_ref()
            .map(Vec::len)
            .unwrap_or(self.scored.len())
    }

    /// Whether the full sort has happened
    pub fn is_fully_sorted(&self) -> bool {
        self.sorted.is_some()
    }

    /// Documents of the zero-based `page`
    pub fn page(&mut self, page: usize, page_size: usize) -> Vec<RankedDocument> {
        if self.sorted.is_none() && page == 0 && page_size <= self.top.capacity() {
            return self.top.entries().iter().take(page_size).cloned().collect();
        }

        let scored = &mut self.scored;
        let sorted = self.sorted.get_or_insert_with(|| {
            let mut all = std::mem::take(scored);
            all.sort_by(rank_order);
            debug!(documents = all.len(), "sorted full ranking");
            all
        });
        // The selection is no longer needed once everything is sorted
        self.top = TopN::new(0);

        sorted
            .iter()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect()
    }
}

pub struct PosteriorEngine {
    priors: Vec<Prior>,
    observations: FastMap<DocId, f64>,
    decay: f64,
    min_observation: f64,
    /// Cached pass; dropped whenever a prior or observation changes
    ranking: Option<Ranking>,
}

impl PosteriorEngine {
    pub fn new(config: &PosteriorConfig) -> Self {
        Self {
            priors: Vec::new(),
            observations: FastMap::default(),
            decay: config.observation_decay,
            min_observation: config.min_observation,
            ranking: None,
        }
    }

    /// Add a prior, replacing one with the same id
    pub fn add_prior(&mut self, prior: Prior) {
        self.priors.retain(|p| p.id != prior.id);
        self.priors.push(prior);
        self.invalidate();
    }

    pub fn remove_prior(&mut self, id: &str) -> Option<Prior> {
        let idx = self.priors.iter().position(|p| p.id == id)?;
        self.invalidate();
        Some(self.priors.remove(idx))
    }

    pub fn set_importance(&mut self, id: &str, importance: Importance) -> bool {
        match self.priors.iter_mut().find(|p| p.id == id) {
            Some(prior) => {
                prior.importance = importance;
                self.invalidate();
                true
            }
            None => false,
        }
    }

    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    /// Record that the user looked at `doc`, lowering its posterior
    pub fn observe(&mut self, doc: &DocId) {
        let factor = self.observations.entry(doc.clone()).or_insert(1.0);
        *factor = (*factor * self.decay).max(self.min_observation);
        self.invalidate();
    }

    pub fn observation(&self, doc: &DocId) -> f64 {
        self.observations.get(doc).copied().unwrap_or(1.0)
    }

    pub fn invalidate(&mut self) {
        self.ranking = None;
    }

    pub fn posterior(&self, doc: &DocId) -> f64 {
        posterior_of(&self.priors, &self.observations, doc)
    }

    /// Rank `candidates`, reusing the last pass while nothing changed.
    ///
    /// Documents with a posterior of exactly zero are excluded.
    pub fn rank(&mut self, candidates: &[DocId], capacity: usize) -> &mut Ranking {
        let stale = self
            .ranking
            .as_ref()
            .map(|r| r.top.capacity() < capacity && !r.is_fully_sorted())
            .unwrap_or(true);
        if stale {
            self.ranking = None;
        }

        let priors = &self.priors;
        let observations = &self.observations;
        self.ranking
            .get_or_insert_with(|| rank_pass(priors, observations, candidates, capacity))
    }
}

fn posterior_of(priors: &[Prior], observations: &FastMap<DocId, f64>, doc: &DocId) -> f64 {
    let observed = observations.get(doc).copied().unwrap_or(1.0);
    priors.iter().map(|prior| prior.factor(doc)).product::<f64>() * observed
}

/// One linear pass: marginal sum plus the running top-N
fn rank_pass(
    priors: &[Prior],
    observations: &FastMap<DocId, f64>,
    candidates: &[DocId],
    capacity: usize,
) -> Ranking {
    let mut top = TopN::new(capacity);
    let mut scored = Vec::with_capacity(candidates.len());
    let mut marginal = 0.0;

    for id in candidates {
        let probability = posterior_of(priors, observations, id);
        if probability <= 0.0 {
            continue;
        }
        marginal += probability;
        let entry = RankedDocument::new(id.clone(), probability);
        if top.would_enter(&entry) {
            top.try_insert(entry.clone());
        }
        scored.push(entry);
    }

    debug!(
        candidates = candidates.len(),
        ranked = scored.len(),
        marginal,
        "posterior pass"
    );
    Ranking {
        top,
        scored,
        sorted: None,
        marginal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<DocId> {
        names.iter().map(|n| DocId::from(*n)).collect()
    }

    fn scores(entries: &[(&str, f64)]) -> FastMap<DocId, f64> {
        entries.iter().map(|(id, s)| (DocId::from(*id), *s)).collect()
    }

    fn engine() -> PosteriorEngine {
        PosteriorEngine::new(&PosteriorConfig::default())
    }

    #[test]
    fn test_transform_levels() {
        assert_eq!(transform(0.9, Importance::None), 0.5);
        assert_eq!(transform(0.9, Importance::Medium), 0.9);
        assert_eq!(transform(0.6, Importance::Critical), 0.999);
        assert_eq!(transform(0.4, Importance::Critical), 0.001);
        assert_eq!(transform(0.5, Importance::Critical), 0.5);
        assert!(transform(0.3, Importance::Low) > 0.3);
        assert!(transform(0.3, Importance::High) < 0.3);
    }

    #[test]
    fn test_filter_cutoff() {
        assert_eq!(transform(0.6, Importance::Filter), 1.0);
        assert_eq!(transform(0.5, Importance::Filter), 0.5);
        assert_eq!(transform(0.49, Importance::Filter), 0.0);
    }

    #[test]
    fn test_filter_prior_posterior() {
        let mut engine = engine();
        let prior = Prior::new("tag", scores(&[("d", 0.6), ("e", 0.2)]))
            .unwrap()
            .with_importance(Importance::Filter);
        engine.add_prior(prior);

        assert_eq!(engine.posterior(&DocId::from("d")), 1.0);
        assert_eq!(engine.posterior(&DocId::from("e")), 0.0);
        // Unlisted documents have no information
        assert_eq!(engine.posterior(&DocId::from("f")), 0.5);

        let ranking = engine.rank(&ids(&["d", "e", "f"]), 10);
        let page: Vec<_> = ranking.page(0, 10).into_iter().map(|r| r.id).collect();
        assert_eq!(page, ids(&["d", "f"]));
    }

    #[test]
    fn test_default_and_complement() {
        let prior = Prior::new("p", scores(&[("a", 0.8)])).unwrap();
        assert_eq!(prior.score(&DocId::from("zzz")), 0.5);
        let prior = prior.with_default(0.3).complemented(true);
        assert!((prior.score(&DocId::from("a")) - 0.2).abs() < 1e-12);
        assert!((prior.score(&DocId::from("zzz")) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_missing_prior_id() {
        assert!(matches!(
            Prior::new(" ", FastMap::default()),
            Err(Error::MissingArgument(_))
        ));
    }

    #[test]
    fn test_priors_multiply() {
        let mut engine = engine();
        engine.add_prior(Prior::new("a", scores(&[("x", 0.8)])).unwrap());
        engine.add_prior(Prior::new("b", scores(&[("x", 0.5)])).unwrap());
        assert!((engine.posterior(&DocId::from("x")) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_add_prior_replaces_same_id() {
        let mut engine = engine();
        engine.add_prior(Prior::new("a", scores(&[("x", 0.8)])).unwrap());
        engine.add_prior(Prior::new("a", scores(&[("x", 0.2)])).unwrap());
        assert_eq!(engine.priors().len(), 1);
        assert!((engine.posterior(&DocId::from("x")) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_observation_decays_but_never_zero() {
        let mut engine = engine();
        let doc = DocId::from("x");
        engine.observe(&doc);
        assert_eq!(engine.observation(&doc), 0.5);
        for _ in 0..100 {
            engine.observe(&doc);
        }
        assert!(engine.observation(&doc) > 0.0);
        assert_eq!(engine.observation(&doc), 1e-6);
    }

    #[test]
    fn test_paging_triggers_full_sort() {
        let mut engine = engine();
        let entries: Vec<(String, f64)> = (0..25)
            .map(|i| (format!("d{:02}", i), 0.01 + i as f64 / 100.0))
            .collect();
        let map: FastMap<DocId, f64> = entries
            .iter()
            .map(|(id, p)| (DocId::from(id.as_str()), *p))
            .collect();
        engine.add_prior(Prior::new("q", map).unwrap());
        let candidates: Vec<DocId> = entries.iter().map(|(id, _)| DocId::from(id.as_str())).collect();

        let ranking = engine.rank(&candidates, 10);
        let first = ranking.page(0, 10);
        assert!(!ranking.is_fully_sorted());
        assert_eq!(first[0].id, DocId::from("d24"));
        assert!((ranking.marginal - entries.iter().map(|(_, p)| p).sum::<f64>()).abs() < 1e-9);

        let second = ranking.page(1, 10);
        assert!(ranking.is_fully_sorted());
        assert_eq!(second[0].id, DocId::from("d14"));
        assert_eq!(ranking.page(2, 10).len(), 5);
        assert_eq!(ranking.page(0, 10), first);
    }

    #[test]
    fn test_changes_invalidate_ranking() {
        let mut engine = engine();
        engine.add_prior(Prior::new("q", scores(&[("a", 0.9), ("b", 0.1)])).unwrap());
        let candidates = ids(&["a", "b"]);
        assert_eq!(engine.rank(&candidates, 5).page(0, 5)[0].id, DocId::from("a"));

        engine.set_importance("q", Importance::None);
        engine.add_prior(Prior::new("r", scores(&[("b", 0.9)])).unwrap());
        assert_eq!(engine.rank(&candidates, 5).page(0, 5)[0].id, DocId::from("b"));
    }

    #[test]
    fn test_importance_from_str() {
        assert_eq!("HIGH".parse::<Importance>().unwrap(), Importance::High);
        assert!("loud".parse::<Importance>().is_err());
    }
}
