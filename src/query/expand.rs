//! Term expansion.
//!
//! A bare word becomes a weighted set of spellings so that `fooBar`
//! also finds `foo_bar`, `foo-bar` and the separate words.

use crate::error::{Error, Result};
use crate::query::parser::QueryNode;
use crate::utils::split_word_parts;

/// Weight of the term exactly as typed
pub const EXACT_WEIGHT: f64 = 1.0;
/// Weight of whole-string joins of the parts
pub const JOIN_WEIGHT: f64 = 0.7;
/// Weight of each individual part
pub const PART_WEIGHT: f64 = 0.3;

const JOINERS: &[&str] = &["", "_", "-"];

/// Case-insensitive, word-bounded regex for `text`
pub fn word_bounded(text: &str) -> String {
    format!(r"(?i)\b{}\b", regex::escape(text))
}

/// Expand a raw term into a `Terms` node of boosted alternatives.
///
/// With `enabled == false` the result holds only the exact term.
pub fn expand_term(term: &str, enabled: bool) -> Result<QueryNode> {
    if term.trim().is_empty() {
        return Err(Error::EmptyTerm);
    }

    let exact = QueryNode::Phrase(term.to_string());
    if !enabled {
        return Ok(QueryNode::Terms(vec![exact.boosted(EXACT_WEIGHT)]));
    }

    let mut parts: Vec<String> = Vec::new();
    for part in split_word_parts(term) {
        let part = part.to_lowercase();
        if !parts.contains(&part) {
            parts.push(part);
        }
    }

    let mut alternatives = Vec::with_capacity(parts.len() + JOINERS.len() + 1);

    if parts.len() < 2 {
        // The lone part would count the same matches again
        let specific = QueryNode::RegexTerm(word_bounded(term));
        alternatives.push(
            QueryNode::Subtract(Box::new(exact), Box::new(specific)).boosted(EXACT_WEIGHT),
        );
        if let Some(part) = parts.first() {
            alternatives.push(QueryNode::RegexTerm(word_bounded(part)).boosted(PART_WEIGHT));
        }
        return Ok(QueryNode::Terms(alternatives));
    }

    alternatives.push(exact.boosted(EXACT_WEIGHT));

    let original = term.to_lowercase();
    for joiner in JOINERS {
        let joined = parts.join(joiner);
        if joined != original {
            alternatives.push(QueryNode::Phrase(joined).boosted(JOIN_WEIGHT));
        }
    }

    for part in parts {
        alternatives.push(QueryNode::Phrase(part).boosted(PART_WEIGHT));
    }

    Ok(QueryNode::Terms(alternatives))
}

/// Rewrite every `Term` in the tree into its expansion.
///
/// Descendants of `Near` and of an expanded term are never expanded.
pub fn expand_tree(node: &QueryNode, enabled: bool) -> Result<QueryNode> {
    let expand_all = |children: &[QueryNode], enabled: bool| -> Result<Vec<QueryNode>> {
        children.iter().map(|c| expand_tree(c, enabled)).collect()
    };

    Ok(match node {
        QueryNode::Term(term) => expand_term(term, enabled)?,
        QueryNode::Phrase(text) | QueryNode::RegexTerm(text) if text.is_empty() => {
            return Err(Error::EmptyTerm);
        }
        QueryNode::Phrase(_) | QueryNode::RegexTerm(_) => node.clone(),
        QueryNode::Terms(children) => QueryNode::Terms(expand_all(children, enabled)?),
        QueryNode::And(children) => QueryNode::And(expand_all(children, enabled)?),
        QueryNode::Near(children) => QueryNode::Near(expand_all(children, false)?),
        QueryNode::Not(child) => QueryNode::Not(Box::new(expand_tree(child, enabled)?)),
        QueryNode::Must(child) => QueryNode::Must(Box::new(expand_tree(child, enabled)?)),
        QueryNode::MustNot(child) => QueryNode::MustNot(Box::new(expand_tree(child, enabled)?)),
        QueryNode::Boost(child, factor) => {
            QueryNode::Boost(Box::new(expand_tree(child, enabled)?), *factor)
        }
        QueryNode::Subtract(general, specific) => QueryNode::Subtract(
            Box::new(expand_tree(general, enabled)?),
            Box::new(expand_tree(specific, enabled)?),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (text, weight) of each boosted phrase alternative
    fn phrases(node: &QueryNode) -> Vec<(String, f64)> {
        let QueryNode::Terms(children) = node else {
            panic!("expected Terms, got {:?}", node);
        };
        children
            .iter()
            .filter_map(|child| match child {
                QueryNode::Boost(inner, w) => match inner.as_ref() {
                    QueryNode::Phrase(text) => Some((text.clone(), *w)),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_camel_case_expansion() {
        let node = expand_term("fooBarBaz", true).unwrap();
        assert_eq!(
            phrases(&node),
            vec![
                ("fooBarBaz".to_string(), 1.0),
                ("foo_bar_baz".to_string(), 0.7),
                ("foo-bar-baz".to_string(), 0.7),
                ("foo".to_string(), 0.3),
                ("bar".to_string(), 0.3),
                ("baz".to_string(), 0.3),
            ]
        );
    }

    #[test]
    fn test_snake_case_skips_identical_join() {
        let node = expand_term("foo_bar", true).unwrap();
        let texts: Vec<String> = phrases(&node).into_iter().map(|(t, _)| t).collect();
        assert_eq!(texts, vec!["foo_bar", "foobar", "foo-bar", "foo", "bar"]);
    }

    #[test]
    fn test_single_part_subtracts_word_match() {
        let node = expand_term("ABC", true).unwrap();
        assert_eq!(
            node,
            QueryNode::Terms(vec![
                QueryNode::Subtract(
                    Box::new(QueryNode::Phrase("ABC".to_string())),
                    Box::new(QueryNode::RegexTerm(r"(?i)\bABC\b".to_string())),
                )
                .boosted(1.0),
                QueryNode::RegexTerm(r"(?i)\babc\b".to_string()).boosted(0.3),
            ])
        );
    }

    #[test]
    fn test_disabled_expansion() {
        assert_eq!(
            expand_term("fooBar", false).unwrap(),
            QueryNode::Terms(vec![QueryNode::Phrase("fooBar".to_string()).boosted(1.0)])
        );
    }

    #[test]
    fn test_blank_term_is_error() {
        assert!(matches!(expand_term("  ", true), Err(Error::EmptyTerm)));
    }

    #[test]
    fn test_empty_literal_is_error() {
        for query in ["\"\"", "#\"\"", "foo (\"\" bar)"] {
            let tree = crate::query::parse_query(query).unwrap();
            assert!(
                matches!(expand_tree(&tree, true), Err(Error::EmptyTerm)),
                "{} should be rejected",
                query
            );
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            expand_term("getUserById", true).unwrap(),
            expand_term("getUserById", true).unwrap()
        );
    }

    #[test]
    fn test_near_children_not_expanded() {
        let tree = QueryNode::Near(vec![
            QueryNode::Term("fooBar".to_string()),
            QueryNode::Term("baz".to_string()),
        ]);
        let QueryNode::Near(children) = expand_tree(&tree, true).unwrap() else {
            panic!("expected Near");
        };
        for child in &children {
            let QueryNode::Terms(alternatives) = child else {
                panic!("expected Terms");
            };
            assert_eq!(alternatives.len(), 1);
        }
    }

    #[test]
    fn test_expand_tree_keeps_structure() {
        let tree = QueryNode::Must(Box::new(QueryNode::Term("x".to_string()).boosted(2.0)));
        let expanded = expand_tree(&tree, true).unwrap();
        let QueryNode::Must(inner) = expanded else {
            panic!("expected Must");
        };
        assert!(matches!(inner.as_ref(), QueryNode::Boost(_, f) if *f == 2.0));
    }
}
