//! Proximity matching for `Near` groups.
//!
//! Each child gets one regex (an alternation of its leaf patterns). A
//! document's content is scanned once, left to right, over the matches
//! of all children. An active set collects which children have matched
//! since the last gap; it is cleared whenever two consecutive matches are
//! more than `distance` lines apart. The document qualifies as soon as
//! the active set covers every child.

use crate::error::Result;
use crate::query::parser::QueryNode;
use crate::source::TermPattern;
use crate::utils::LineIndex;
use regex::Regex;

/// Patterns whose matches represent `node` in content.
///
/// Negated branches contribute nothing and a `Subtract` is represented
/// by its general side only.
pub fn match_patterns(node: &QueryNode) -> Vec<TermPattern> {
    let mut out = Vec::new();
    collect_match_patterns(node, &mut out);
    out
}

fn collect_match_patterns(node: &QueryNode, out: &mut Vec<TermPattern>) {
    match node {
        QueryNode::Term(text) | QueryNode::Phrase(text) => {
            push_unique(out, TermPattern::Literal(text.clone()))
        }
        QueryNode::RegexTerm(pattern) => push_unique(out, TermPattern::Regex(pattern.clone())),
        QueryNode::Terms(children) | QueryNode::And(children) | QueryNode::Near(children) => {
            for child in children {
                collect_match_patterns(child, out);
            }
        }
        QueryNode::Must(child) | QueryNode::Boost(child, _) => collect_match_patterns(child, out),
        QueryNode::Subtract(general, _) => collect_match_patterns(general, out),
        QueryNode::Not(_) | QueryNode::MustNot(_) => {}
    }
}

fn push_unique(out: &mut Vec<TermPattern>, pattern: TermPattern) {
    if !out.contains(&pattern) {
        out.push(pattern);
    }
}

/// One regex matching any of `patterns`
pub fn alternation(patterns: &[TermPattern]) -> Result<Regex> {
    if let [single] = patterns {
        return single.compile();
    }
    let joined = patterns
        .iter()
        .map(|p| format!("(?:{})", p.to_regex()))
        .collect::<Vec<_>>()
        .join("|");
    TermPattern::Regex(joined).compile()
}

pub struct NearMatcher {
    children: Vec<Regex>,
    distance: usize,
}

impl NearMatcher {
    pub fn new(children: &[QueryNode], distance: usize) -> Result<Self> {
        let children = children
            .iter()
            .map(|child| alternation(&match_patterns(child)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { children, distance })
    }

    pub fn qualifies(&self, content: &str) -> bool {
        let wanted = self.children.len();
        if wanted == 0 {
            return false;
        }

        let mut events: Vec<(usize, usize)> = Vec::new();
        for (child, regex) in self.children.iter().enumerate() {
            events.extend(regex.find_iter(content).map(|m| (m.start(), child)));
        }
        events.sort_unstable();

        let lines = LineIndex::new(content);
        let mut active = vec![false; wanted];
        let mut active_count = 0;
        let mut last_line: Option<usize> = None;

        for (offset, child) in events {
            let line = lines.line_of(offset);
            if let Some(last) = last_line {
                if line - last > self.distance {
                    active.iter_mut().for_each(|a| *a = false);
                    active_count = 0;
                }
            }
            last_line = Some(line);

            if !active[child] {
                active[child] = true;
                active_count += 1;
                if active_count == wanted {
                    return true;
                }
            }
        }

        false
    }
}
