//! Query language and evaluation.
//!
//! A query string goes through these stages:
//!
//! 1. [`lexer`] and [`parser`] build a [`QueryNode`] tree
//! 2. [`expand`] rewrites bare terms into weighted spellings
//! 3. [`executor`] combines gathered leaf counts per operator, wrapping
//!    intermediate results in the [`envelope`] types
//! 4. [`scorer`] ranks the flattened leaves with BM25 or BM25F
//! 5. [`normalize`] maps scores into a probability band
//!
//! [`mark`] reuses stages 1 and 2 to produce highlight ranges.

pub mod envelope;
pub mod executor;
pub mod expand;
pub mod lexer;
pub mod mark;
pub mod near;
pub mod normalize;
pub mod parser;
pub mod scorer;

pub use envelope::{CalcType, Leaf, Payload, Tagged, TermMap};
pub use executor::{intersect, leaf_patterns, ExecContext, QueryExecutor};
pub use expand::{expand_term, expand_tree};
pub use mark::{mark_query, regex_finder};
pub use normalize::{normalize, ProbabilityMap};
pub use parser::{parse_query, QueryNode, DEFAULT_BOOST};
pub use scorer::{CorpusStats, ScoreMap, Scorer};
