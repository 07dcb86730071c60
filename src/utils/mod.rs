//! Utility functions shared by the query core and the sources.
//!
//! - [`tokenizer`] - Unicode-aware word-part splitting (camelCase, snake_case)
//! - [`content`] - binary detection and byte-offset to line mapping
//!
//! ```
//! use sift::utils::split_word_parts;
//!
//! assert_eq!(split_word_parts("getUserById"), vec!["get", "User", "By", "Id"]);
//! ```

pub mod content;
pub mod tokenizer;

pub use content::*;
pub use tokenizer::*;
