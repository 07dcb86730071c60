use regex::Regex;
use std::sync::OnceLock;

/// Runs of Unicode word characters (letters, marks, numbers).
/// Connector punctuation such as `_` separates parts so snake_case splits.
fn word_run_regex() -> &'static Regex {
    static WORD_RUN: OnceLock<Regex> = OnceLock::new();
    WORD_RUN.get_or_init(|| Regex::new(r"[\p{L}\p{M}\p{N}]+").expect("valid regex literal"))
}

/// Split a term into word parts.
///
/// Parts break on non-word characters and on lowercase-to-uppercase
/// transitions, so `fooBar-baz_qux` yields `foo`, `Bar`, `baz`, `qux`.
/// Case is preserved; callers lowercase when they need to.
pub fn split_word_parts(term: &str) -> Vec<String> {
    let mut parts = Vec::new();

    for run in word_run_regex().find_iter(term) {
        let mut current = String::new();
        let mut prev_was_lower = false;

        for ch in run.as_str().chars() {
            // CamelCase split: uppercase after lowercase
            if ch.is_uppercase() && prev_was_lower && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            current.push(ch);
            prev_was_lower = ch.is_lowercase();
        }

        if !current.is_empty() {
            parts.push(current);
        }
    }

    parts
}
