//! Parenthesis validation. Evaluation trusts its input blindly, so nothing
//! may reach the evaluator without passing through here first.

use crate::diagnostics::{report_error_at_token, ErrorKind, SourceRegistry};
use crate::syntax::{Token, TokenKind};

/// Checks that every open parenthesis has a matching close and vice versa.
/// Reports each unbalanced site and returns false if any were found.
pub fn validate_parentheses(tokens: &[Token], sources: &SourceRegistry) -> bool {
    let mut open_stack: Vec<&Token> = Vec::new();
    let mut valid = true;

    for token in tokens {
        match token.kind {
            TokenKind::OpenParen => open_stack.push(token),
            TokenKind::CloseParen => {
                if open_stack.pop().is_none() {
                    report_error_at_token(
                        sources,
                        ErrorKind::UnbalancedParens,
                        token,
                        "close parenthesis without a matching open",
                    );
                    valid = false;
                }
            }
            _ => {}
        }
    }

    for unclosed in open_stack {
        report_error_at_token(
            sources,
            ErrorKind::UnbalancedParens,
            unclosed,
            "open parenthesis was never closed",
        );
        valid = false;
    }

    valid
}

/// Index of the close parenthesis matching the open at `open_index`. Input
/// must have passed `validate_parentheses`.
pub fn find_close_paren_index(tokens: &[Token], open_index: usize) -> usize {
    debug_assert_eq!(tokens[open_index].kind, TokenKind::OpenParen);
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(open_index) {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth -= 1;
                if depth == 0 {
                    return index;
                }
            }
            _ => {}
        }
    }
    // Unreachable on validated input; point past the end so callers stop.
    tokens.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::tokenizer::tokenize_line;
    use std::sync::Arc;

    fn tokens_of(text: &str) -> Vec<Token> {
        let source: Arc<str> = Arc::from("test.scn");
        let mut tokens = Vec::new();
        tokenize_line(text, &source, 1, 0, &mut tokens).unwrap();
        tokens
    }

    #[test]
    fn balanced_input_passes() {
        let tokens = tokens_of("(a (b c) (d (e)))");
        assert!(validate_parentheses(&tokens, &SourceRegistry::new()));
    }

    #[test]
    fn unbalanced_input_fails() {
        assert!(!validate_parentheses(&tokens_of("(a (b)"), &SourceRegistry::new()));
        assert!(!validate_parentheses(&tokens_of("(a))"), &SourceRegistry::new()));
    }

    #[test]
    fn finds_matching_close() {
        let tokens = tokens_of("(a (b c) d)");
        assert_eq!(find_close_paren_index(&tokens, 0), tokens.len() - 1);
        assert_eq!(find_close_paren_index(&tokens, 2), 5);
    }
}
