//! Unified diagnostics.
//!
//! One error type, `SconeError`, carries everything the reporting layer
//! needs: an [`ErrorKind`] for the diagnostic code, a message, and optional
//! source/span/help context. Errors with a registered source render as full
//! miette reports with an underlined span; errors anchored at tokens whose
//! provenance is a macro expansion (no backing text) fall back to a plain
//! `file:line:col:` prefix in the message.
//!
//! The evaluator accumulates: it reports through [`report_error_at_token`]
//! and keeps going, returning error counts. `Result<_, SconeError>` is
//! reserved for hard failures such as I/O, lexing, and process spawning.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, Report, SourceSpan};
use thiserror::Error;

use crate::syntax::{Span, Token};

/// Full text of every tokenized source, keyed by the name tokens carry.
/// Registered once by the driver so any token can be turned into a rich
/// diagnostic later, long after the file handle is gone.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: HashMap<Arc<str>, Arc<String>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: Arc<str>, content: Arc<String>) {
        self.sources.insert(name, content);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<String>> {
        self.sources.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    UnbalancedParens,
    DuplicateDefinition,
    BuiltinShadowed,
    MacroFailure,
    GeneratorFailure,
    UnresolvedReference,
    InvalidScope,
    Toolchain,
    Io,
    Internal,
}

impl ErrorKind {
    fn code(self) -> &'static str {
        match self {
            ErrorKind::Lex => "scone::lex",
            ErrorKind::UnbalancedParens => "scone::unbalanced_parens",
            ErrorKind::DuplicateDefinition => "scone::duplicate_definition",
            ErrorKind::BuiltinShadowed => "scone::builtin_shadowed",
            ErrorKind::MacroFailure => "scone::macro_failure",
            ErrorKind::GeneratorFailure => "scone::generator_failure",
            ErrorKind::UnresolvedReference => "scone::unresolved_reference",
            ErrorKind::InvalidScope => "scone::invalid_scope",
            ErrorKind::Toolchain => "scone::toolchain",
            ErrorKind::Io => "scone::io",
            ErrorKind::Internal => "scone::internal",
        }
    }
}

/// The single error type. No variants with duplicated fields; the kind is
/// data, and the optional context decides how much miette can render.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SconeError {
    pub kind: ErrorKind,
    pub message: String,
    src: Option<NamedSource<String>>,
    span: Option<SourceSpan>,
    help: Option<String>,
}

impl SconeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            src: None,
            span: None,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_source(mut self, name: &str, content: &str, span: Span) -> Self {
        self.src = Some(NamedSource::new(name, content.to_string()));
        self.span = Some(SourceSpan::new(span.start.into(), span.len()));
        self
    }

    pub fn io(context: impl Into<String>, error: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, format!("{}: {}", context.into(), error))
    }
}

impl Diagnostic for SconeError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.src.as_ref().map(|src| src as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.span.map(|span| {
            Box::new(std::iter::once(LabeledSpan::new_with_span(None, span)))
                as Box<dyn Iterator<Item = LabeledSpan>>
        })
    }
}

/// Builds an error anchored at a token. Prefers a real registered source so
/// miette can underline it; falls back to embedding the location in the
/// message when the token was synthesized by a macro.
pub fn error_at_token(
    sources: &SourceRegistry,
    kind: ErrorKind,
    token: &Token,
    message: impl Into<String>,
) -> SconeError {
    let message = message.into();
    match sources.get(&token.source) {
        Some(content) if !token.span.is_empty() && token.span.end <= content.len() => {
            SconeError::new(kind, message).with_source(&token.source, content, token.span)
        }
        _ => SconeError::new(
            kind,
            format!(
                "{}:{}:{}: {}",
                token.source, token.line, token.column_start, message
            ),
        ),
    }
}

/// Prints a diagnostic report to stderr. The caller keeps going; counting is
/// its job.
pub fn report(error: SconeError) {
    eprintln!("{:?}", Report::new(error));
}

/// Report-and-continue convenience used throughout evaluation.
pub fn report_error_at_token(
    sources: &SourceRegistry,
    kind: ErrorKind,
    token: &Token,
    message: impl Into<String>,
) {
    report(error_at_token(sources, kind, token, message));
}

/// Secondary diagnostic line attached to a previous error.
pub fn note_at_token(token: &Token, message: impl fmt::Display) {
    eprintln!(
        "{}:{}:{}: note: {}",
        token.source, token.line, token.column_start, message
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::TokenKind;

    #[test]
    fn token_errors_prefer_registered_sources() {
        let mut sources = SourceRegistry::new();
        let name: Arc<str> = Arc::from("main.scn");
        sources.register(name.clone(), Arc::new("(oops)".to_string()));

        let token = Token {
            kind: TokenKind::Symbol,
            contents: "oops".to_string(),
            source: name,
            line: 1,
            column_start: 1,
            column_end: 5,
            span: Span { start: 1, end: 5 },
        };
        let error = error_at_token(&sources, ErrorKind::MacroFailure, &token, "macro failed");
        assert!(error.src.is_some());
        assert_eq!(error.message, "macro failed");
    }

    #[test]
    fn synthesized_tokens_fall_back_to_plain_locations() {
        let sources = SourceRegistry::new();
        let template = Token::internal("template");
        let token = Token::synthesized(TokenKind::Symbol, "ghost", &template);
        let error = error_at_token(&sources, ErrorKind::Internal, &token, "no backing text");
        assert!(error.src.is_none());
        assert!(error.message.contains("no backing text"));
        assert!(error.message.contains("<internal>"));
    }
}
