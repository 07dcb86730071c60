//! Scatter/gather of leaf terms over document sources.
//!
//! Every (term, source) pair runs on its own worker thread and replies
//! on a channel. The gather loop is the join barrier: it folds replies in
//! whatever order they arrive, stops waiting at the source timeout and
//! bails out as soon as the generation's token trips. Late replies land
//! on a dropped receiver and are discarded.

use crate::error::{Error, Result};
use crate::session::CancelToken;
use crate::source::{
    count_matches, DocId, DocumentResolver, DocumentSource, FastSet, Property, PropertyAccessor,
    Resolution, SourceContext, TermCounts, TermPattern,
};
use rayon::prelude::*;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often the gather loop re-checks for cancellation
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Treats every reported document as canonical
pub struct AcceptAll;

impl DocumentResolver for AcceptAll {
    fn resolve(&self, _id: &DocId) -> Resolution {
        Resolution::Canonical
    }
}

/// Keeps documents the session listed, drops everything else
pub struct CandidateResolver {
    known: FastSet<DocId>,
}

impl CandidateResolver {
    pub fn new(candidates: &[DocId]) -> Self {
        Self {
            known: candidates.iter().cloned().collect(),
        }
    }
}

impl DocumentResolver for CandidateResolver {
    fn resolve(&self, id: &DocId) -> Resolution {
        if self.known.contains(id) {
            Resolution::Canonical
        } else {
            Resolution::Unknown
        }
    }
}

/// Property access across all sources; the first source that knows a
/// document answers for it.
pub struct SourceAccessor<'a> {
    sources: &'a [Arc<dyn DocumentSource>],
}

impl<'a> SourceAccessor<'a> {
    pub fn new(sources: &'a [Arc<dyn DocumentSource>]) -> Self {
        Self { sources }
    }
}

impl PropertyAccessor for SourceAccessor<'_> {
    fn property(&self, id: &DocId, name: &str) -> Option<Property> {
        self.sources.iter().find_map(|s| s.property(id, name))
    }
}

/// Outcome counters of one gather
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: u64,
    pub failures: u64,
    pub timeouts: u64,
}

struct Reply {
    pattern: usize,
    source: usize,
    result: Result<TermCounts>,
}

pub struct Dispatcher<'a> {
    sources: &'a [Arc<dyn DocumentSource>],
    resolver: &'a dyn DocumentResolver,
    timeout: Duration,
    token: &'a CancelToken,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        sources: &'a [Arc<dyn DocumentSource>],
        resolver: &'a dyn DocumentResolver,
        timeout: Duration,
        token: &'a CancelToken,
    ) -> Self {
        Self {
            sources,
            resolver,
            timeout,
            token,
        }
    }

    /// Count every pattern in every source; result `i` belongs to
    /// `patterns[i]`.
    ///
    /// Failed or timed-out sources contribute nothing. Only cancellation
    /// is an error.
    pub fn gather(&self, patterns: &[TermPattern]) -> Result<(Vec<TermCounts>, DispatchReport)> {
        let mut results = vec![TermCounts::default(); patterns.len()];
        let mut report = DispatchReport::default();
        if patterns.is_empty() || self.sources.is_empty() {
            return Ok((results, report));
        }

        // Tripped on timeout so stragglers stop early
        let scatter = self.token.child();
        let (tx, rx) = mpsc::channel();
        let mut outstanding: FastSet<(usize, usize)> = FastSet::default();

        for (pattern_idx, pattern) in patterns.iter().enumerate() {
            for (source_idx, source) in self.sources.iter().enumerate() {
                let tx = tx.clone();
                let source = Arc::clone(source);
                let pattern = pattern.clone();
                let ctx = SourceContext::new(scatter.clone());
                debug!(source = source.name(), term = %pattern.to_regex(), "dispatch");

                thread::Builder::new()
                    .name("sift-source".to_string())
                    .spawn(move || {
                        let result = source.term_frequency(&ctx, &pattern);
                        let _ = tx.send(Reply {
                            pattern: pattern_idx,
                            source: source_idx,
                            result,
                        });
                    })?;

                outstanding.insert((pattern_idx, source_idx));
                report.dispatched += 1;
            }
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        while !outstanding.is_empty() {
            if self.token.is_cancelled() {
                scatter.cancel();
                return Err(Error::Cancelled);
            }

            let now = Instant::now();
            if now >= deadline {
                for &(pattern_idx, source_idx) in &outstanding {
                    warn!(
                        source = self.sources[source_idx].name(),
                        term = %patterns[pattern_idx].to_regex(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "source timed out"
                    );
                }
                report.timeouts += outstanding.len() as u64;
                scatter.cancel();
                break;
            }

            match rx.recv_timeout((deadline - now).min(CANCEL_POLL)) {
                Ok(reply) => {
                    outstanding.remove(&(reply.pattern, reply.source));
                    match reply.result {
                        Ok(counts) => self.fold(counts, &mut results[reply.pattern]),
                        Err(Error::Cancelled) if self.token.is_cancelled() => {
                            return Err(Error::Cancelled);
                        }
                        Err(e) => {
                            warn!(
                                source = self.sources[reply.source].name(),
                                term = %patterns[reply.pattern].to_regex(),
                                error = %e,
                                "source failed"
                            );
                            report.failures += 1;
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok((results, report))
    }

    /// Merge raw counts under canonical identifiers
    fn fold(&self, raw: TermCounts, into: &mut TermCounts) {
        for (id, count) in raw {
            match self.resolver.resolve(&id) {
                Resolution::Canonical => *into.entry(id).or_insert(0) += count,
                Resolution::Remapped(targets) => {
                    for target in targets {
                        *into.entry(target).or_insert(0) += count;
                    }
                }
                Resolution::Unknown => {}
            }
        }
    }
}

/// Matches of `pattern` in the declared fields of each candidate.
///
/// With `only`, just the named fields are searched. Zero counts are omitted.
pub fn field_counts(
    accessor: &dyn PropertyAccessor,
    candidates: &[DocId],
    pattern: &TermPattern,
    only: Option<&[String]>,
) -> Result<TermCounts> {
    let regex = pattern.compile()?;
    let wanted = |name: &str| only.map(|names| names.iter().any(|n| n == name)).unwrap_or(true);

    Ok(candidates
        .par_iter()
        .filter_map(|id| {
            let count: u64 = accessor
                .fields(id)
                .iter()
                .filter(|field| wanted(&field.name))
                .map(|field| {
                    field
                        .value
                        .texts()
                        .map(|text| count_matches(&regex, text))
                        .sum::<u64>()
                })
                .sum();
            (count > 0).then(|| (id.clone(), count))
        })
        .collect())
}
