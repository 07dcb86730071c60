//! Query sessions.
//!
//! A [`Session`] owns the configured sources and the posterior engine and
//! runs queries in generations. Starting a query, or calling
//! [`SessionHandle::restart`] from any thread, supersedes the running
//! generation: its token trips, pending source calls are abandoned and
//! its evaluation returns [`Error::Cancelled`]. Term counts are cached
//! per generation and discarded when a new one begins.

pub mod dispatch;

pub use dispatch::{
    field_counts, AcceptAll, CandidateResolver, DispatchReport, Dispatcher, SourceAccessor,
};

use crate::config::SiftConfig;
use crate::error::{Error, Result};
use crate::posterior::{Importance, PosteriorEngine, Prior, RankedDocument};
use crate::query::{
    expand_tree, leaf_patterns, normalize, parse_query, CorpusStats, ExecContext, ProbabilityMap,
    QueryExecutor, Scorer,
};
use crate::source::{
    DocId, DocumentResolver, DocumentSource, FastMap, FastSet, PropertyAccessor, SourceContext,
    TermCounts, TermPattern,
};
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Id of the prior installed from query probabilities
pub const QUERY_PRIOR: &str = "query";

/// Cooperative cancellation flag.
///
/// A child token reports cancelled when it or any ancestor was cancelled;
/// cancelling a child leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }
}

/// Thread-safe handle for superseding a session's running query
#[derive(Debug, Clone)]
pub struct SessionHandle {
    generation: Arc<AtomicU64>,
    current: Arc<Mutex<CancelToken>>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            current: Arc::new(Mutex::new(CancelToken::new())),
        }
    }

    /// Cancel the running generation and return the new generation number
    pub fn restart(&self) -> u64 {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        current.cancel();
        debug!(generation, "generation restarted");
        generation
    }

    /// Start a generation owned by the caller.
    ///
    /// The bump and the token swap happen under one lock, so a concurrent
    /// `restart` always cancels the token of the generation it supersedes.
    fn begin(&self) -> (u64, CancelToken) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        current.cancel();
        let token = CancelToken::new();
        *current = token.clone();
        debug!(generation, "generation started");
        (generation, token)
    }

    fn current_token(&self) -> CancelToken {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub generation: u64,
    pub queries: u64,
    pub term_cache_hits: u64,
    pub term_cache_misses: u64,
    pub dispatches: u64,
    pub source_failures: u64,
    pub source_timeouts: u64,
}

/// One page of ranked results
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub page: usize,
    pub page_size: usize,
    /// Documents with a non-zero posterior
    pub total: usize,
    /// Sum of all posteriors
    pub marginal: f64,
    pub documents: Vec<RankedDocument>,
}

pub struct Session {
    config: SiftConfig,
    sources: Vec<Arc<dyn DocumentSource>>,
    resolver: Option<Arc<dyn DocumentResolver>>,
    handle: SessionHandle,
    /// Generation the caches below belong to
    cache_generation: u64,
    term_cache: FastMap<String, TermCounts>,
    candidates: Option<Arc<Vec<DocId>>>,
    posterior: PosteriorEngine,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: SiftConfig) -> Self {
        let posterior = PosteriorEngine::new(&config.posterior);
        Self {
            config,
            sources: Vec::new(),
            resolver: None,
            handle: SessionHandle::new(),
            cache_generation: 0,
            term_cache: FastMap::default(),
            candidates: None,
            posterior,
            stats: SessionStats::default(),
        }
    }

    pub fn with_source(mut self, source: impl DocumentSource + 'static) -> Self {
        self.add_source(Arc::new(source));
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn DocumentSource>) {
        self.sources.push(source);
        self.candidates = None;
        self.posterior.invalidate();
    }

    /// Replace the default resolver, which keeps only listed documents
    pub fn with_resolver(mut self, resolver: impl DocumentResolver + 'static) -> Self {
        self.set_resolver(Arc::new(resolver));
        self
    }

    pub fn set_resolver(&mut self, resolver: Arc<dyn DocumentResolver>) {
        self.resolver = Some(resolver);
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            generation: self.handle.generation(),
            ..self.stats
        }
    }

    pub fn accessor(&self) -> SourceAccessor<'_> {
        SourceAccessor::new(&self.sources)
    }

    /// Parse, gather, combine, score and normalize `query`.
    ///
    /// `field_filter` restricts matching to the named document fields; no
    /// source is dispatched in that case.
    pub fn run_query(
        &mut self,
        query: &str,
        document_count: usize,
        total_size: u64,
        field_filter: Option<&[String]>,
    ) -> Result<ProbabilityMap> {
        let (generation, token) = self.begin_generation();
        let corpus = CorpusStats::new(document_count, total_size);
        self.evaluate(query, corpus, field_filter, generation, &token)
    }

    /// Run `query` over every listed document and return the requested
    /// zero-based page of the posterior ranking.
    pub fn search(&mut self, query: &str, page: usize) -> Result<SearchResults> {
        self.search_fields(query, page, None)
    }

    pub fn search_fields(
        &mut self,
        query: &str,
        page: usize,
        field_filter: Option<&[String]>,
    ) -> Result<SearchResults> {
        let (generation, token) = self.begin_generation();
        let candidates = self.candidates(&token)?;
        let corpus = {
            let accessor = self.accessor();
            let total_size: u64 = candidates
                .par_iter()
                .map(|id| accessor.size(id).unwrap_or(0))
                .sum();
            CorpusStats::new(candidates.len(), total_size)
        };

        let probabilities = self.evaluate(query, corpus, field_filter, generation, &token)?;
        let prior = Prior::from_probabilities(QUERY_PRIOR, probabilities)?
            .with_importance(self.config.posterior.query_importance);
        self.posterior.add_prior(prior);
        self.results(page)
    }

    /// Re-page the current ranking, e.g. after priors changed
    pub fn results(&mut self, page: usize) -> Result<SearchResults> {
        let token = self.handle.current_token();
        let candidates = self.candidates(&token)?;
        let page_size = self.config.search.page_size.max(1);
        let ranking = self.posterior.rank(&candidates, page_size);
        let documents = ranking.page(page, page_size);
        Ok(SearchResults {
            page,
            page_size,
            total: ranking.total(),
            marginal: ranking.marginal,
            documents,
        })
    }

    /// Highlight ranges of `query` in `content`
    pub fn mark(&self, query: &str, content: &str) -> Result<Vec<Range<usize>>> {
        crate::query::mark_query(
            query,
            self.config.search.expand_terms,
            crate::query::regex_finder(content),
        )
    }

    pub fn add_prior(&mut self, prior: Prior) {
        self.posterior.add_prior(prior);
    }

    pub fn remove_prior(&mut self, id: &str) -> Option<Prior> {
        self.posterior.remove_prior(id)
    }

    pub fn set_importance(&mut self, id: &str, importance: Importance) -> bool {
        self.posterior.set_importance(id, importance)
    }

    pub fn observe(&mut self, doc: &DocId) {
        self.posterior.observe(doc);
    }

    pub fn posterior(&self) -> &PosteriorEngine {
        &self.posterior
    }

    fn begin_generation(&mut self) -> (u64, CancelToken) {
        let (generation, token) = self.handle.begin();

        if self.cache_generation != generation {
            self.term_cache.clear();
            self.candidates = None;
            self.cache_generation = generation;
        }
        self.stats.queries += 1;
        (generation, token)
    }

    fn ensure_current(&self, generation: u64, token: &CancelToken) -> Result<()> {
        if token.is_cancelled() || self.handle.generation() != generation {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn evaluate(
        &mut self,
        query: &str,
        corpus: CorpusStats,
        field_filter: Option<&[String]>,
        generation: u64,
        token: &CancelToken,
    ) -> Result<ProbabilityMap> {
        let span = info_span!("query", generation, query);
        let _enter = span.enter();
        let started = Instant::now();

        if self.sources.is_empty() && field_filter.is_none() {
            return Err(Error::MissingArgument("sources"));
        }

        let tree = expand_tree(&parse_query(query)?, self.config.search.expand_terms)?;
        let patterns = leaf_patterns(&tree);
        for pattern in &patterns {
            pattern.compile()?;
        }

        let candidates = self.candidates(token)?;
        self.ensure_current(generation, token)?;

        let counts = self.gather(&patterns, &candidates, field_filter, token)?;
        self.ensure_current(generation, token)?;

        let accessor = SourceAccessor::new(&self.sources);
        let tagged = QueryExecutor::new(ExecContext {
            counts: &counts,
            accessor: &accessor,
            near_distance: self.config.search.near_distance,
            token,
        })
        .evaluate(&tree)?;

        let scorer = Scorer::for_model(
            self.config.search.ranking,
            corpus,
            &accessor,
            &self.config.search.field_weights,
            &candidates,
        );
        let scores = scorer.rank(&tagged.flatten());
        let probabilities = normalize(&scores);
        self.ensure_current(generation, token)?;

        info!(
            terms = patterns.len(),
            matched = probabilities.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query evaluated"
        );
        Ok(probabilities)
    }

    /// Listed documents of every source, deduplicated in listing order
    fn candidates(&mut self, token: &CancelToken) -> Result<Arc<Vec<DocId>>> {
        if let Some(candidates) = &self.candidates {
            return Ok(Arc::clone(candidates));
        }

        let ctx = SourceContext::new(token.clone());
        let mut seen = FastSet::default();
        let mut listed = Vec::new();
        for source in &self.sources {
            match source.list_documents(&ctx) {
                Ok(ids) => listed.extend(ids.into_iter().filter(|id| seen.insert(id.clone()))),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(source = source.name(), error = %e, "listing failed");
                    self.stats.source_failures += 1;
                }
            }
        }
        debug!(documents = listed.len(), "listed candidates");

        let candidates = Arc::new(listed);
        self.candidates = Some(Arc::clone(&candidates));
        Ok(candidates)
    }

    /// Counts per pattern, from the generation cache where possible
    fn gather(
        &mut self,
        patterns: &[TermPattern],
        candidates: &[DocId],
        field_filter: Option<&[String]>,
        token: &CancelToken,
    ) -> Result<FastMap<TermPattern, TermCounts>> {
        let mut counts = FastMap::default();
        let mut misses = Vec::new();
        for pattern in patterns {
            match self.term_cache.get(&pattern.to_regex()) {
                Some(cached) => {
                    self.stats.term_cache_hits += 1;
                    counts.insert(pattern.clone(), cached.clone());
                }
                None => {
                    self.stats.term_cache_misses += 1;
                    misses.push(pattern.clone());
                }
            }
        }
        if misses.is_empty() {
            return Ok(counts);
        }

        let mut gathered = match field_filter {
            Some(_) => vec![TermCounts::default(); misses.len()],
            None => {
                let fallback;
                let resolver: &dyn DocumentResolver = match &self.resolver {
                    Some(resolver) => resolver.as_ref(),
                    None => {
                        fallback = CandidateResolver::new(candidates);
                        &fallback
                    }
                };
                let dispatcher = Dispatcher::new(
                    &self.sources,
                    resolver,
                    self.config.search.source_timeout(),
                    token,
                );
                let (gathered, report) = dispatcher.gather(&misses)?;
                self.stats.dispatches += report.dispatched;
                self.stats.source_failures += report.failures;
                self.stats.source_timeouts += report.timeouts;
                gathered
            }
        };

        let accessor = SourceAccessor::new(&self.sources);
        for (pattern, merged) in misses.iter().zip(gathered.iter_mut()) {
            for (id, n) in field_counts(&accessor, candidates, pattern, field_filter)? {
                *merged.entry(id).or_insert(0) += n;
            }
        }

        for (pattern, merged) in misses.into_iter().zip(gathered) {
            self.term_cache
                .entry(pattern.to_regex())
                .or_insert_with(|| merged.clone());
            counts.insert(pattern, merged);
        }
        Ok(counts)
    }
}
