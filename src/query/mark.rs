//! Highlight ranges for previews.

use crate::error::Result;
use crate::query::expand::expand_tree;
use crate::query::near::match_patterns;
use crate::query::parser::parse_query;
use crate::source::TermPattern;
use std::ops::Range;
use tracing::warn;

/// Byte ranges `finder` reports for every positive leaf of `query`,
/// sorted with overlapping ranges merged.
pub fn mark_query<F>(query: &str, expand: bool, mut finder: F) -> Result<Vec<Range<usize>>>
where
    F: FnMut(&TermPattern) -> Vec<Range<usize>>,
{
    let tree = expand_tree(&parse_query(query)?, expand)?;
    let mut ranges: Vec<Range<usize>> = match_patterns(&tree)
        .iter()
        .flat_map(|pattern| finder(pattern))
        .filter(|range| range.start < range.end)
        .collect();
    ranges.sort_by_key(|range| (range.start, range.end));
    Ok(coalesce(ranges))
}

/// Finder matching each pattern's regex against `content`
pub fn regex_finder(content: &str) -> impl FnMut(&TermPattern) -> Vec<Range<usize>> + '_ {
    move |pattern| match pattern.compile() {
        Ok(regex) => regex.find_iter(content).map(|m| m.range()).collect(),
        Err(e) => {
            warn!(term = %pattern, error = %e, "skipping unmarkable term");
            Vec::new()
        }
    }
}

fn coalesce(sorted: Vec<Range<usize>>) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_expanded_parts() {
        let content = "let foo_bar = foo + bar;";
        let ranges = mark_query("fooBar", true, regex_finder(content)).unwrap();
        // foo_bar covers its parts; the later foo and bar stand alone
        assert_eq!(ranges, vec![4..11, 14..17, 20..23]);
    }

    #[test]
    fn test_negated_terms_are_not_marked() {
        let content = "alpha beta";
        let ranges = mark_query("alpha -beta !beta", true, regex_finder(content)).unwrap();
        assert_eq!(ranges, vec![0..5]);
    }

    #[test]
    fn test_phrase_is_marked_whole() {
        let content = "x int main () y";
        let ranges = mark_query("\"int main ()\"", true, regex_finder(content)).unwrap();
        assert_eq!(ranges, vec![2..13]);
    }

    #[test]
    fn test_coalesce_overlaps() {
        assert_eq!(coalesce(vec![0..3, 2..5, 5..6, 8..9]), vec![0..6, 8..9]);
    }

    #[test]
    fn test_parse_error_propagates() {
        assert!(mark_query("\"open", true, regex_finder("")).is_err());
    }

    #[test]
    fn test_custom_finder_sees_leaves() {
        let mut seen = Vec::new();
        mark_query("(a b)~", true, |pattern| {
            seen.push(pattern.clone());
            Vec::new()
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                TermPattern::Literal("a".to_string()),
                TermPattern::Literal("b".to_string()),
            ]
        );
    }
}
