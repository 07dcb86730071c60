use crate::error::ParseError;
use crate::query::lexer::{tokenize, Token, TokenKind};

/// Boost applied by a bare `^`
pub const DEFAULT_BOOST: f64 = 1.3;

/// Query AST node
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Bare word, expanded into spelling alternatives at execution time
    Term(String),
    /// Quoted literal, matched case-insensitively as written
    Phrase(String),
    /// Regex pattern (`#term`)
    RegexTerm(String),
    /// Weighted alternatives, scored independently
    Terms(Vec<QueryNode>),
    /// Every child must match; counts combine by minimum
    And(Vec<QueryNode>),
    /// Children must match within a few lines of each other
    Near(Vec<QueryNode>),
    /// Subtracts its score without changing candidates
    Not(Box<QueryNode>),
    /// Restricts results to documents matching the child
    Must(Box<QueryNode>),
    /// Removes documents matching the child
    MustNot(Box<QueryNode>),
    Boost(Box<QueryNode>, f64),
    /// General counts minus specific counts
    Subtract(Box<QueryNode>, Box<QueryNode>),
}

impl QueryNode {
    /// Shorthand for `Boost(node, factor)`
    pub fn boosted(self, factor: f64) -> Self {
        QueryNode::Boost(Box::new(self), factor)
    }

    /// An empty query matches nothing
    pub fn is_empty(&self) -> bool {
        matches!(self, QueryNode::Terms(children) if children.is_empty())
    }
}

/// Parse a query string into its operator tree.
///
/// One statement parses to itself; several become a `Terms` node; an
/// empty or blank query parses to an empty `Terms`.
pub fn parse_query(input: &str) -> Result<QueryNode, ParseError> {
    let tokens = tokenize(input)?;
    QueryParser::new(tokens).parse()
}

/// An atom before postfix modifiers are applied
enum Atom {
    Single(QueryNode),
    Group(Vec<QueryNode>),
}

impl Atom {
    fn into_node(self) -> QueryNode {
        match self {
            Atom::Single(node) => node,
            Atom::Group(mut items) if items.len() == 1 => items.remove(0),
            Atom::Group(items) => QueryNode::And(items),
        }
    }

    fn into_near(self) -> QueryNode {
        match self {
            Atom::Single(node) => QueryNode::Near(vec![node]),
            Atom::Group(items) => QueryNode::Near(items),
        }
    }
}

/// Single pass, one token of lookahead
struct QueryParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl QueryParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<QueryNode, ParseError> {
        let mut statements = Vec::new();
        while !self.is_eof() {
            statements.push(self.parse_statement()?);
        }

        if statements.len() == 1 {
            Ok(statements.remove(0))
        } else {
            Ok(QueryNode::Terms(statements))
        }
    }

    fn parse_statement(&mut self) -> Result<QueryNode, ParseError> {
        let prefix = match self.peek().map(|t| &t.kind) {
            Some(
                kind @ (TokenKind::Not | TokenKind::Must | TokenKind::MustNot | TokenKind::RegexTag),
            ) => {
                let kind = kind.clone();
                self.pos += 1;
                Some(kind)
            }
            _ => None,
        };

        let atom_token = self.peek().cloned();
        let atom = self.parse_atom()?;

        let atom = if prefix == Some(TokenKind::RegexTag) {
            Atom::Single(regex_tagged(atom, atom_token)?)
        } else {
            atom
        };

        let node = self.parse_postfix(atom);

        Ok(match prefix {
            Some(TokenKind::Not) => QueryNode::Not(Box::new(node)),
            Some(TokenKind::Must) => QueryNode::Must(Box::new(node)),
            Some(TokenKind::MustNot) => QueryNode::MustNot(Box::new(node)),
            _ => node,
        })
    }

    fn parse_atom(&mut self) -> Result<Atom, ParseError> {
        let token = self.next().ok_or(ParseError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Word(word) => Ok(Atom::Single(QueryNode::Term(word))),
            TokenKind::Literal(text) => Ok(Atom::Single(QueryNode::Phrase(text))),
            TokenKind::LParen => self.parse_group(),
            _ => Err(unexpected(&token)),
        }
    }

    /// Group of bare words and literals up to the closing paren
    fn parse_group(&mut self) -> Result<Atom, ParseError> {
        let mut items = Vec::new();
        loop {
            let token = self.next().ok_or(ParseError::UnexpectedEnd)?;
            match token.kind {
                TokenKind::Word(word) => items.push(QueryNode::Term(word)),
                TokenKind::Literal(text) => items.push(QueryNode::Phrase(text)),
                TokenKind::RParen if !items.is_empty() => return Ok(Atom::Group(items)),
                _ => return Err(unexpected(&token)),
            }
        }
    }

    fn parse_postfix(&mut self, mut atom: Atom) -> QueryNode {
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Near) => {
                    self.pos += 1;
                    atom = Atom::Single(atom.into_near());
                }
                Some(TokenKind::Boost(factor)) => {
                    let factor = factor.unwrap_or(DEFAULT_BOOST);
                    self.pos += 1;
                    atom = Atom::Single(atom.into_node().boosted(factor));
                }
                _ => return atom.into_node(),
            }
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

/// `#` turns a single word or literal into a regex term
fn regex_tagged(atom: Atom, token: Option<Token>) -> Result<QueryNode, ParseError> {
    match atom {
        Atom::Single(QueryNode::Term(text)) | Atom::Single(QueryNode::Phrase(text)) => {
            Ok(QueryNode::RegexTerm(text))
        }
        _ => {
            let (token, position) = token
                .map(|t| (t.kind.to_string(), t.position))
                .unwrap_or_default();
            Err(ParseError::InvalidRegexTag { token, position })
        }
    }
}

fn unexpected(token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        token: token.kind.to_string(),
        position: token.position,
    }
}
