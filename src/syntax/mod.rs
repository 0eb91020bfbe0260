//! Lexing and structural validation of source text.

pub mod tokenizer;
pub mod validator;

pub use tokenizer::{
    pretty_print_tokens, tokenize_line, Span, Token, TokenKind, TokenList, MAX_LINE_LENGTH,
};
pub use validator::{find_close_paren_index, validate_parentheses};
