//! Built-in generators and macros.
//!
//! Everything here shares the tagged registry with user compile-time code
//! loaded later; registration order never matters because a name can only
//! ever hold one entry and user definitions that collide with a built-in
//! are rejected at definition time.

pub mod fundamental;

use crate::eval::{evaluate_all, Context, Environment, Scope};
use crate::output::{
    add_lang_token_output, add_string_output, FormatMode, GeneratorOutput, OutputFragment,
};
use crate::syntax::{find_close_paren_index, Token, TokenKind, TokenList};

pub use fundamental::register_fundamental_generators;

/// Emits `name(arg, arg, ...)`, the shape shared by calls to known runtime
/// functions and by speculative guesses at unknown names. In statement
/// position the call is terminated and put on its own line.
pub fn function_invocation_generator(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let name = &tokens[invocation_index + 1];
    add_string_output(
        &mut output.source,
        &name.contents,
        FormatMode::ConvertFunctionName,
        name,
    );
    add_lang_token_output(&mut output.source, FormatMode::OpenParen, name);

    let argument_context = context.with_scope(Scope::ExpressionsOnly);
    let delimiter = OutputFragment::Text {
        text: ", ".to_string(),
        mode: FormatMode::ListSeparator,
        origin: None,
    };
    let num_errors = evaluate_all(
        environment,
        &argument_context,
        tokens,
        invocation_index + 2,
        Some(&delimiter),
        output,
    );

    add_lang_token_output(&mut output.source, FormatMode::CloseParen, name);
    if context.scope == Scope::Body {
        add_lang_token_output(&mut output.source, FormatMode::EndStatement, name);
    }

    num_errors == 0
}

/// Sample built-in macro: `(square X)` becomes `(* X X)`. Registered by the
/// driver so a fresh checkout has a macro to exercise end to end.
pub fn square_macro(
    _environment: &mut Environment,
    _context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    output: &mut Vec<Token>,
) -> bool {
    let invocation_start = &tokens[invocation_index];
    let name = &tokens[invocation_index + 1];

    let argument_start = invocation_index + 2;
    if tokens[argument_start].kind == TokenKind::CloseParen {
        return false;
    }
    let argument_end = if tokens[argument_start].kind == TokenKind::OpenParen {
        find_close_paren_index(tokens, argument_start)
    } else {
        argument_start
    };

    output.push(Token::synthesized(
        TokenKind::OpenParen,
        "(",
        invocation_start,
    ));
    output.push(Token::synthesized(TokenKind::Symbol, "*", name));
    for _ in 0..2 {
        output.extend(tokens[argument_start..=argument_end].iter().cloned());
    }
    output.push(Token::synthesized(
        TokenKind::CloseParen,
        ")",
        invocation_start,
    ));
    true
}
