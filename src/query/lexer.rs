//! Query tokenizer.
//!
//! Whitespace separates tokens. A bare word-run ends at whitespace or at
//! any of `: ~ @ ! ^ / " ( )`; `:`, `@` and `/` are otherwise ignored.
//! `+`, `-` and `#` are prefix operators only where a token starts, so
//! `foo-bar` stays one word.

use crate::error::ParseError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word-run
    Word(String),
    /// Double-quoted literal with escapes applied
    Literal(String),
    /// `!`
    Not,
    /// `+`
    Must,
    /// `-`
    MustNot,
    /// `#`
    RegexTag,
    LParen,
    RParen,
    /// `~`
    Near,
    /// `^` with an optional explicit factor
    Boost(Option<f64>),
    /// The literal keyword `AND`
    And,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "{}", w),
            TokenKind::Literal(s) => write!(f, "\"{}\"", s),
            TokenKind::Not => write!(f, "!"),
            TokenKind::Must => write!(f, "+"),
            TokenKind::MustNot => write!(f, "-"),
            TokenKind::RegexTag => write!(f, "#"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Near => write!(f, "~"),
            TokenKind::Boost(None) => write!(f, "^"),
            TokenKind::Boost(Some(n)) => write!(f, "^{}", n),
            TokenKind::And => write!(f, "AND"),
        }
    }
}

/// A token and the byte offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Characters that end a bare word-run without being part of it
fn is_terminator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, ':' | '~' | '@' | '!' | '^' | '/' | '"' | '(' | ')')
}

/// Terminators that carry no meaning of their own
fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, ':' | '@' | '/')
}

/// Tokenize a query string
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(ch) = self.peek_char() {
            let start = self.pos;

            if is_separator(ch) {
                self.advance();
                continue;
            }

            let kind = match ch {
                '"' => self.lex_literal()?,
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '~' => self.single(TokenKind::Near),
                '!' => self.single(TokenKind::Not),
                '^' => self.lex_boost(),
                '+' | '-' | '#' if self.prefix_applies() => {
                    self.advance();
                    match ch {
                        '+' => TokenKind::Must,
                        '-' => TokenKind::MustNot,
                        _ => TokenKind::RegexTag,
                    }
                }
                _ => self.lex_word(),
            };

            self.tokens.push(Token {
                kind,
                position: start,
            });
        }

        Ok(self.tokens)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// A prefix operator needs something to apply to
    fn prefix_applies(&self) -> bool {
        let mut rest = self.remaining().chars();
        rest.next();
        rest.next().map(|next| !next.is_whitespace()).unwrap_or(false)
    }

    fn lex_literal(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.advance(); // opening quote
        let mut text = String::new();

        loop {
            match self.peek_char() {
                None => return Err(ParseError::UnmatchedQuote { position: start }),
                Some('"') => {
                    self.advance();
                    return Ok(TokenKind::Literal(text));
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some('"') => text.push('"'),
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => {
                            // Unknown escapes are kept verbatim
                            text.push('\\');
                            text.push(other);
                        }
                        None => return Err(ParseError::UnmatchedQuote { position: start }),
                    }
                    self.advance();
                }
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn lex_boost(&mut self) -> TokenKind {
        self.advance(); // '^'
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }

        match self.input[start..self.pos].parse::<f64>() {
            Ok(factor) => TokenKind::Boost(Some(factor)),
            Err(_) => {
                // No explicit factor, rewind so the text lexes normally
                self.pos = start;
                TokenKind::Boost(None)
            }
        }
    }

    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if is_terminator(ch) {
                break;
            }
            self.advance();
        }

        let word = &self.input[start..self.pos];
        if word == "AND" {
            TokenKind::And
        } else {
            TokenKind::Word(word.to_string())
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn remaining(&self) -> &str {
        &self.input[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_quoted_literal() {
        assert_eq!(
            kinds("\"int main ()\""),
            vec![TokenKind::Literal("int main ()".to_string())]
        );
    }

    #[test]
    fn test_literal_escapes() {
        assert_eq!(
            kinds(r#""say \"hi\"\tnow\n" "a\\b""#),
            vec![
                TokenKind::Literal("say \"hi\"\tnow\n".to_string()),
                TokenKind::Literal("a\\\\b".to_string()),
            ]
        );
    }

    #[test]
    fn test_unmatched_quote_reports_start() {
        assert_eq!(
            tokenize("foo \"bar baz"),
            Err(ParseError::UnmatchedQuote { position: 4 })
        );
    }

    #[test]
    fn test_prefix_operators() {
        assert_eq!(
            kinds("!a +b -c #d"),
            vec![
                TokenKind::Not,
                TokenKind::Word("a".into()),
                TokenKind::Must,
                TokenKind::Word("b".into()),
                TokenKind::MustNot,
                TokenKind::Word("c".into()),
                TokenKind::RegexTag,
                TokenKind::Word("d".into()),
            ]
        );
    }

    #[test]
    fn test_plus_minus_inside_word() {
        assert_eq!(
            kinds("foo-bar c++ a#b"),
            vec![
                TokenKind::Word("foo-bar".into()),
                TokenKind::Word("c++".into()),
                TokenKind::Word("a#b".into()),
            ]
        );
    }

    #[test]
    fn test_lone_minus_is_a_word() {
        assert_eq!(
            kinds("a - b"),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::Word("-".into()),
                TokenKind::Word("b".into()),
            ]
        );
    }

    #[test]
    fn test_terminators_split_words() {
        assert_eq!(
            kinds("path/to:file@host(x)"),
            vec![
                TokenKind::Word("path".into()),
                TokenKind::Word("to".into()),
                TokenKind::Word("file".into()),
                TokenKind::Word("host".into()),
                TokenKind::LParen,
                TokenKind::Word("x".into()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_boost_tokens() {
        assert_eq!(
            kinds("foo^3 bar^ baz^1.5"),
            vec![
                TokenKind::Word("foo".into()),
                TokenKind::Boost(Some(3.0)),
                TokenKind::Word("bar".into()),
                TokenKind::Boost(None),
                TokenKind::Word("baz".into()),
                TokenKind::Boost(Some(1.5)),
            ]
        );
    }

    #[test]
    fn test_near_and_tabs() {
        assert_eq!(
            kinds("(fox\tbear)~"),
            vec![
                TokenKind::LParen,
                TokenKind::Word("fox".into()),
                TokenKind::Word("bear".into()),
                TokenKind::RParen,
                TokenKind::Near,
            ]
        );
    }

    #[test]
    fn test_and_keyword_is_case_sensitive() {
        assert_eq!(
            kinds("a AND b and ANDROID"),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::And,
                TokenKind::Word("b".into()),
                TokenKind::Word("and".into()),
                TokenKind::Word("ANDROID".into()),
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("  ab !cd").unwrap();
        assert_eq!(tokens[0].position, 2);
        assert_eq!(tokens[1].position, 5);
        assert_eq!(tokens[2].position, 6);
    }
}
