//! Line-driven tokenizer producing the immutable token vectors everything
//! downstream hangs pointers off of.
//!
//! The grammar is deliberately tiny: parentheses, symbols, strings, and `;`
//! line comments. Each call handles exactly one line so the driver can report
//! lex failures with a bare line number before any evaluation starts.

use std::sync::Arc;

use pest::Parser;
use pest_derive::Parser;

use crate::diagnostics::{ErrorKind, SconeError};

/// Lines beyond this length are rejected as a lex error.
pub const MAX_LINE_LENGTH: usize = 2048;

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct LineParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OpenParen,
    CloseParen,
    Symbol,
    String,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::OpenParen => "open parenthesis",
            TokenKind::CloseParen => "close parenthesis",
            TokenKind::Symbol => "symbol",
            TokenKind::String => "string",
        }
    }
}

/// Byte range within a registered source text. Zero-width for synthesized
/// tokens, which have no backing text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One lexed token. Immutable once stored in the environment; everything that
/// needs to point at source positions clones or references these.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Symbol text, or string contents without the surrounding quotes.
    pub contents: String,
    pub source: Arc<str>,
    pub line: u32,
    pub column_start: u32,
    pub column_end: u32,
    pub span: Span,
}

impl Token {
    /// A token with no backing source text, stamped with the provenance of
    /// `template` so diagnostics still point somewhere sensible. Macros use
    /// this to manufacture their expansions.
    pub fn synthesized(kind: TokenKind, contents: impl Into<String>, template: &Token) -> Token {
        Token {
            kind,
            contents: contents.into(),
            source: template.source.clone(),
            line: template.line,
            column_start: template.column_start,
            column_end: template.column_end,
            span: Span::default(),
        }
    }

    /// A token belonging to no source at all, for internal sentinels.
    pub fn internal(contents: impl Into<String>) -> Token {
        Token {
            kind: TokenKind::Symbol,
            contents: contents.into(),
            source: Arc::from("<internal>"),
            line: 0,
            column_start: 0,
            column_end: 0,
            span: Span::default(),
        }
    }
}

/// An environment-owned, immutable token vector. Handles stay valid for as
/// long as any clone of the `Arc` lives, so growth of the containers that
/// store these can never invalidate a reference site.
pub type TokenList = Arc<Vec<Token>>;

/// Tokenizes one line, appending to `out`. `line_offset` is the byte offset
/// of the line start within the full registered source, used to give tokens
/// absolute spans for diagnostics.
pub fn tokenize_line(
    line: &str,
    source: &Arc<str>,
    line_number: u32,
    line_offset: usize,
    out: &mut Vec<Token>,
) -> Result<(), SconeError> {
    if line.len() > MAX_LINE_LENGTH {
        return Err(SconeError::new(
            ErrorKind::Lex,
            format!(
                "{}:{}: line exceeds {} bytes",
                source, line_number, MAX_LINE_LENGTH
            ),
        ));
    }

    let parsed = LineParser::parse(Rule::line, line).map_err(|error| {
        SconeError::new(
            ErrorKind::Lex,
            format!("{}:{}: {}", source, line_number, error.variant.message()),
        )
    })?;

    let line_rule = parsed.peek().expect("grammar guarantees a line rule");
    for pair in line_rule.into_inner() {
        let (kind, contents) = match pair.as_rule() {
            Rule::open_paren => (TokenKind::OpenParen, "(".to_string()),
            Rule::close_paren => (TokenKind::CloseParen, ")".to_string()),
            Rule::string => {
                let text = pair.as_str();
                (TokenKind::String, text[1..text.len() - 1].to_string())
            }
            Rule::symbol => (TokenKind::Symbol, pair.as_str().to_string()),
            Rule::EOI => continue,
            rule => unreachable!("unexpected token rule {:?}", rule),
        };

        let pair_span = pair.as_span();
        out.push(Token {
            kind,
            contents,
            source: source.clone(),
            line: line_number,
            column_start: pair_span.start() as u32,
            column_end: pair_span.end() as u32,
            span: Span {
                start: line_offset + pair_span.start(),
                end: line_offset + pair_span.end(),
            },
        });
    }

    Ok(())
}

/// Renders a token slice as an s-expression, one top-level form per line.
/// Used when diagnostics need to show a macro expansion that has no backing
/// source text.
pub fn pretty_print_tokens(tokens: &[Token]) -> String {
    let mut text = String::new();
    let mut depth = 0usize;
    let mut needs_space = false;
    for token in tokens {
        match token.kind {
            TokenKind::OpenParen => {
                if needs_space {
                    text.push(' ');
                }
                text.push('(');
                depth += 1;
                needs_space = false;
            }
            TokenKind::CloseParen => {
                text.push(')');
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    text.push('\n');
                    needs_space = false;
                } else {
                    needs_space = true;
                }
            }
            TokenKind::Symbol => {
                if needs_space {
                    text.push(' ');
                }
                text.push_str(&token.contents);
                needs_space = true;
            }
            TokenKind::String => {
                if needs_space {
                    text.push(' ');
                }
                text.push('"');
                text.push_str(&token.contents);
                text.push('"');
                needs_space = true;
            }
        }
    }
    text
}
