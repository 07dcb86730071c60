//! # Sift - multi-source relevance engine
//!
//! Sift ranks documents against a free-text query without building an
//! index. Leaf terms of the query are sent to pluggable document sources
//! for match counts, combined according to the query's boolean,
//! proximity and boost operators, scored with BM25 and folded together
//! with any number of independent priors into a posterior probability.
//!
//! ## Architecture
//!
//! - [`query`] - query language, term expansion, combinators, BM25 scoring
//! - [`source`] - document source contracts and the memory, filesystem
//!   and subprocess sources
//! - [`session`] - generations, caches, cancellation and source dispatch
//! - [`posterior`] - priors, importance transforms and top-N ranking
//! - [`output`] - terminal rendering
//! - [`config`] and [`logging`] - TOML configuration and `tracing` setup
//!
//! ## Quick Start
//!
//! ```
//! use sift::config::SiftConfig;
//! use sift::session::Session;
//! use sift::source::MemorySource;
//!
//! let docs = [("a", "parse the query"), ("b", "rank the documents")];
//! let mut session = Session::new(SiftConfig::default())
//!     .with_source(MemorySource::from_texts("notes", docs));
//!
//! let results = session.search("query", 0).unwrap();
//! assert_eq!(results.documents[0].id.as_str(), "a");
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod posterior;
pub mod query;
pub mod session;
pub mod source;
pub mod utils;

pub use config::SiftConfig;
pub use error::{Error, ParseError, Result};
pub use posterior::{Importance, PosteriorEngine, Prior, RankedDocument};
pub use query::{mark_query, parse_query, ProbabilityMap, QueryNode};
pub use session::{CancelToken, SearchResults, Session, SessionHandle};
pub use source::{DocId, DocumentResolver, DocumentSource, PropertyAccessor, TermPattern};
