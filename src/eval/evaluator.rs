//! The recursive evaluator.
//!
//! Walks a validated token vector and decides, per form, between macro
//! expansion, generator dispatch, emitting a call to a known function, or
//! deferring the invocation as an unresolved reference for the builder to
//! settle later. Deliberately error-accumulating: a broken sub-form is
//! reported and skipped so one run surfaces as many diagnostics as
//! possible.

use tracing::trace;

use crate::diagnostics::{note_at_token, report_error_at_token, ErrorKind};
use crate::eval::context::{Context, Scope};
use crate::eval::environment::{Environment, GuessState, ObjectReference};
use crate::generators::function_invocation_generator;
use crate::output::{
    add_lang_token_output, add_splice_output, add_string_output, new_splice_buffer, FormatMode,
    GeneratorOutput, OutputFragment,
};
use crate::syntax::{
    find_close_paren_index, pretty_print_tokens, validate_parentheses, Token, TokenKind, TokenList,
};

/// Evaluates the single form starting at `index`. An open paren is an
/// invocation, a close paren terminates the enclosing list (and is not an
/// error here), anything else is an atom. Returns the number of errors
/// encountered.
pub fn evaluate_form(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    index: usize,
    output: &mut GeneratorOutput,
) -> u32 {
    let token = &tokens[index];
    match token.kind {
        TokenKind::OpenParen => {
            if handle_invocation(environment, context, tokens, index, output) {
                0
            } else {
                1
            }
        }
        // End of a body or argument list. Validated input guarantees this
        // is the only way a close paren reaches us.
        TokenKind::CloseParen => 0,
        _ => evaluate_atom(environment, context, token, output),
    }
}

/// Evaluates each top-level form from `start_index` until a balancing close
/// paren or the end of the vector. The delimiter template, if any, is
/// cloned and re-stamped with the current token between successive forms,
/// never before the first.
pub fn evaluate_all(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    start_index: usize,
    delimiter: Option<&OutputFragment>,
    output: &mut GeneratorOutput,
) -> u32 {
    let mut num_errors = 0;
    let mut index = start_index;
    while index < tokens.len() {
        if tokens[index].kind == TokenKind::CloseParen {
            break;
        }

        if index != start_index {
            if let Some(OutputFragment::Text { text, mode, .. }) = delimiter {
                output.source.push(OutputFragment::Text {
                    text: text.clone(),
                    mode: *mode,
                    origin: Some(tokens[index].clone()),
                });
            }
        }

        num_errors += evaluate_form(environment, context, tokens, index, output);

        if tokens[index].kind == TokenKind::OpenParen {
            index = find_close_paren_index(tokens, index);
        }
        index += 1;
    }
    num_errors
}

fn evaluate_atom(
    environment: &mut Environment,
    context: &Context,
    token: &Token,
    output: &mut GeneratorOutput,
) -> u32 {
    if context.scope != Scope::ExpressionsOnly {
        report_error_at_token(
            &environment.sources,
            ErrorKind::InvalidScope,
            token,
            format!(
                "evaluated constant or symbol is only allowed in expressions-only scope, not {}",
                context.scope.describe()
            ),
        );
        return 1;
    }

    match token.kind {
        TokenKind::Symbol => {
            let mut characters = token.contents.chars();
            let first = characters.next().unwrap_or('\0');
            let second = characters.next().unwrap_or('\0');
            let is_literal = first == '\''
                || first.is_ascii_digit()
                || (first == '-' && (second == '.' || second.is_ascii_digit()));

            if is_literal {
                add_string_output(&mut output.source, &token.contents, FormatMode::None, token);
            } else if environment.hot_reload
                && environment
                    .find_module_state_variable(&token.contents)
                    .is_some()
            {
                // State variables are reified as pointers for reload
                // stability, so every access goes through a dereference.
                add_lang_token_output(&mut output.source, FormatMode::OpenParen, token);
                add_string_output(&mut output.source, "*", FormatMode::None, token);
                add_string_output(
                    &mut output.source,
                    &token.contents,
                    FormatMode::ConvertVariableName,
                    token,
                );
                add_lang_token_output(&mut output.source, FormatMode::CloseParen, token);
            } else {
                add_string_output(
                    &mut output.source,
                    &token.contents,
                    FormatMode::ConvertVariableName,
                    token,
                );
            }
            0
        }
        TokenKind::String => {
            add_string_output(
                &mut output.source,
                &token.contents,
                FormatMode::SurroundWithQuotes,
                token,
            );
            0
        }
        _ => unreachable!("parens are handled by evaluate_form"),
    }
}

/// Dispatches the invocation starting at `invocation_index`: registered
/// macro, registered generator, known runtime function, or deferral as an
/// unresolved reference. Only the resolver ever decides that a deferred
/// reference is a function call.
fn handle_invocation(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let invocation_start = &tokens[invocation_index];
    let invocation_name = &tokens[invocation_index + 1];
    if invocation_name.kind != TokenKind::Symbol {
        report_error_at_token(
            &environment.sources,
            ErrorKind::GeneratorFailure,
            invocation_name,
            format!(
                "expected symbol at invocation start, found {}",
                invocation_name.kind.describe()
            ),
        );
        return false;
    }

    if let Some(invoked_macro) = environment.find_macro(&invocation_name.contents) {
        // Each expansion gets its own vector: token lists are immutable
        // once stored, which is what keeps every handle into them valid.
        let mut expansion_tokens: Vec<Token> = Vec::new();
        let succeeded = invoked_macro(
            environment,
            context,
            tokens,
            invocation_index,
            &mut expansion_tokens,
        );

        if !succeeded {
            report_error_at_token(
                &environment.sources,
                ErrorKind::MacroFailure,
                invocation_name,
                "macro returned failure",
            );
            return false;
        }

        // No output is fine; the invocation is a no-op.
        if expansion_tokens.is_empty() {
            return true;
        }

        if !validate_parentheses(&expansion_tokens, &environment.sources) {
            note_at_token(
                invocation_start,
                "code was generated from macro. See erroneous macro expansion below:",
            );
            eprintln!("{}", pretty_print_tokens(&expansion_tokens));
            return false;
        }

        // The expansion is interned before evaluation: even if evaluation
        // fails, captured reference sites and diagnostics point into it.
        let expansion = environment.intern_expansion(expansion_tokens);

        // Macros inherit the current context, unlike bodies.
        let result = evaluate_all(environment, context, &expansion, 0, None, output);
        if result != 0 {
            note_at_token(
                invocation_start,
                "code was generated from macro. See macro expansion below:",
            );
            eprintln!("{}", pretty_print_tokens(&expansion));
            return false;
        }

        return true;
    }

    if let Some(invoked_generator) = environment.find_generator(&invocation_name.contents) {
        return invoked_generator(environment, context, tokens, invocation_index, output);
    }

    // A definition we already know to be a runtime function becomes a call
    // right away.
    let known_function = environment
        .definitions
        .get(&invocation_name.contents)
        .is_some_and(|definition| !definition.kind.is_compile_time());
    if known_function {
        return function_invocation_generator(
            environment,
            context,
            tokens,
            invocation_index,
            output,
        );
    }

    // Unknown reference. It could be a macro or generator that has not been
    // defined (or loaded) yet, so no guessing here; leave a splice so
    // output ordering survives, and let the builder come back to it.
    trace!(
        target: "scone::references",
        "deferring unknown invocation {}", invocation_name.contents
    );
    let splice_output = new_splice_buffer();
    add_splice_output(&mut output.source, &splice_output);

    let reference = ObjectReference {
        tokens: tokens.clone(),
        start_index: invocation_index,
        context: context.clone(),
        splice_output: splice_output.clone(),
        is_resolved: false,
    };

    match environment.add_object_reference(invocation_name, reference) {
        None => {
            report_error_at_token(
                &environment.sources,
                ErrorKind::Internal,
                invocation_start,
                "failed to create reference status",
            );
            false
        }
        // The builder has already guessed every site of this name as a
        // function call; keep this late site consistent with them.
        Some(GuessState::Guessed) => {
            let mut splice = splice_output.borrow_mut();
            function_invocation_generator(
                environment,
                context,
                tokens,
                invocation_index,
                &mut splice,
            )
        }
        Some(_) => true,
    }
}
