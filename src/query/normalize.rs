//! Min-max mapping of raw scores into a probability band.

use crate::query::scorer::ScoreMap;
use crate::source::{DocId, FastMap};

/// Probability of the lowest-scoring matched document
pub const MIN_PROBABILITY: f64 = 0.5;
/// Probability of the highest-scoring matched document
pub const MAX_PROBABILITY: f64 = 0.7;
/// Probability of documents the query did not match
pub const DEFAULT_PROBABILITY: f64 = 0.3;

/// Per-document probabilities plus the value for everything else
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    pub values: FastMap<DocId, f64>,
    pub default: f64,
}

impl Default for ProbabilityMap {
    fn default() -> Self {
        Self {
            values: FastMap::default(),
            default: DEFAULT_PROBABILITY,
        }
    }
}

impl ProbabilityMap {
    pub fn get(&self, id: &DocId) -> f64 {
        self.values.get(id).copied().unwrap_or(self.default)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Map scores linearly into `[MIN_PROBABILITY, MAX_PROBABILITY]`
pub fn normalize(scores: &ScoreMap) -> ProbabilityMap {
    let (min, max) = scores
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        });

    let span = MAX_PROBABILITY - MIN_PROBABILITY;
    let values = scores
        .iter()
        .map(|(id, &score)| {
            let p = if max > min {
                MIN_PROBABILITY + span * (score - min) / (max - min)
            } else {
                MAX_PROBABILITY
            };
            (id.clone(), p)
        })
        .collect();

    ProbabilityMap {
        values,
        default: DEFAULT_PROBABILITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(entries: &[(&str, f64)]) -> ScoreMap {
        entries.iter().map(|(id, s)| (DocId::from(*id), *s)).collect()
    }

    #[test]
    fn test_equal_scores_map_to_max() {
        let probs = normalize(&scores(&[("a", 2.0), ("b", 2.0)]));
        assert_eq!(probs.get(&DocId::from("a")), 0.7);
        assert_eq!(probs.get(&DocId::from("b")), 0.7);
    }

    #[test]
    fn test_linear_band() {
        let probs = normalize(&scores(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]));
        assert!((probs.get(&DocId::from("a")) - 0.5).abs() < 1e-12);
        assert!((probs.get(&DocId::from("b")) - 0.6).abs() < 1e-12);
        assert!((probs.get(&DocId::from("c")) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_absent_documents_get_default() {
        let probs = normalize(&scores(&[("a", -4.0), ("b", 9.0)]));
        assert_eq!(probs.get(&DocId::from("zzz")), 0.3);
        assert_eq!(normalize(&ScoreMap::default()).get(&DocId::from("a")), 0.3);
    }
}
