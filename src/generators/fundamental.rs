//! The fundamental generators: definitions, variables, and the arithmetic
//! operators the surface language cannot live without.
//!
//! Each of these follows the same discipline: validate shape, register
//! whatever the environment needs to know, then emit. Errors are reported
//! at the offending token and the generator returns false so the caller
//! can keep accumulating.

use std::collections::HashMap;

use crate::converters::{lisp_name_to_c_name, NameStyleSettings};
use crate::diagnostics::{report_error_at_token, ErrorKind};
use crate::eval::{
    evaluate_all, evaluate_form, Context, Environment, ObjectDefinition, ObjectKind, Scope,
};
use crate::output::{
    add_lang_token_output, add_string_output, new_splice_buffer, FormatMode, GeneratorOutput,
    OutputFragment,
};
use crate::syntax::{find_close_paren_index, Token, TokenKind, TokenList};

pub fn register_fundamental_generators(environment: &mut Environment) {
    environment.register_generator("defun", defun_generator);
    environment.register_generator("defmacro", defmacro_generator);
    environment.register_generator("defgenerator", defgenerator_generator);
    environment.register_generator("var", var_generator);

    for operator in ["+", "-", "*", "/", "%", "=", "!=", "<", "<=", ">", ">="] {
        environment.register_generator(operator, infix_operator_generator);
    }
}

fn expect_token_kind(
    environment: &Environment,
    token: &Token,
    kind: TokenKind,
    expected: &str,
) -> bool {
    if token.kind != kind {
        report_error_at_token(
            &environment.sources,
            ErrorKind::GeneratorFailure,
            token,
            format!("expected {}, found {}", expected, token.kind.describe()),
        );
        return false;
    }
    true
}

fn expect_module_scope(environment: &Environment, context: &Context, token: &Token) -> bool {
    if context.scope != Scope::Module {
        report_error_at_token(
            &environment.sources,
            ErrorKind::InvalidScope,
            token,
            format!(
                "definitions are only allowed at module scope, not {}",
                context.scope.describe()
            ),
        );
        return false;
    }
    true
}

/// `(defun name (param type ...) [return-type] body...)`
///
/// Registers a runtime function definition and emits it inline into the
/// module output. Body references are tracked under the function's name.
fn defun_generator(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let invocation_name = &tokens[invocation_index + 1];
    if !expect_module_scope(environment, context, invocation_name) {
        return false;
    }

    let name = &tokens[invocation_index + 2];
    if !expect_token_kind(environment, name, TokenKind::Symbol, "function name") {
        return false;
    }
    let params_open = invocation_index + 3;
    if !expect_token_kind(
        environment,
        &tokens[params_open],
        TokenKind::OpenParen,
        "parameter list",
    ) {
        return false;
    }
    let params_close = find_close_paren_index(tokens, params_open);

    let mut parameters: Vec<(&Token, &Token)> = Vec::new();
    let mut param_index = params_open + 1;
    while param_index < params_close {
        if param_index + 1 >= params_close {
            report_error_at_token(
                &environment.sources,
                ErrorKind::GeneratorFailure,
                &tokens[param_index],
                "parameter is missing a type",
            );
            return false;
        }
        let param_name = &tokens[param_index];
        let param_type = &tokens[param_index + 1];
        if !expect_token_kind(environment, param_name, TokenKind::Symbol, "parameter name")
            || !expect_token_kind(environment, param_type, TokenKind::Symbol, "parameter type")
        {
            return false;
        }
        parameters.push((param_name, param_type));
        param_index += 2;
    }

    // A bare symbol after the parameter list is the return type; bodies
    // start with a paren.
    let mut body_start = params_close + 1;
    let mut return_type = "void".to_string();
    if body_start < tokens.len() && tokens[body_start].kind == TokenKind::Symbol {
        return_type = tokens[body_start].contents.clone();
        body_start += 1;
    }

    let registered = environment.add_object_definition(ObjectDefinition {
        name: name.clone(),
        kind: ObjectKind::Function,
        output: None,
        is_required: false,
        is_loaded: false,
        references: HashMap::new(),
    });
    if !registered {
        return false;
    }

    add_string_output(
        &mut output.source,
        return_type,
        FormatMode::ConvertVariableName,
        name,
    );
    add_string_output(
        &mut output.source,
        &name.contents,
        FormatMode::ConvertFunctionName,
        name,
    );
    add_lang_token_output(&mut output.source, FormatMode::OpenParen, name);
    for (position, (param_name, param_type)) in parameters.iter().enumerate() {
        if position != 0 {
            output.source.push(OutputFragment::Text {
                text: ", ".to_string(),
                mode: FormatMode::ListSeparator,
                origin: Some((*param_name).clone()),
            });
        }
        add_string_output(
            &mut output.source,
            &param_type.contents,
            FormatMode::ConvertVariableName,
            param_type,
        );
        add_string_output(
            &mut output.source,
            &param_name.contents,
            FormatMode::ConvertVariableName,
            param_name,
        );
    }
    add_lang_token_output(&mut output.source, FormatMode::CloseParen, name);
    add_string_output(&mut output.source, "{", FormatMode::NewlineAfter, name);

    let body_context = context.with_definition(name.clone(), Scope::Body);
    let num_errors = evaluate_all(
        environment,
        &body_context,
        tokens,
        body_start,
        None,
        output,
    );

    add_string_output(&mut output.source, "}", FormatMode::NewlineAfter, name);
    num_errors == 0
}

/// `(defmacro name (params...) body...)`
fn defmacro_generator(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    output: &mut GeneratorOutput,
) -> bool {
    compile_time_definition_generator(
        environment,
        context,
        tokens,
        invocation_index,
        output,
        ObjectKind::CompileTimeMacro,
    )
}

/// `(defgenerator name (params...) body...)`
fn defgenerator_generator(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    output: &mut GeneratorOutput,
) -> bool {
    compile_time_definition_generator(
        environment,
        context,
        tokens,
        invocation_index,
        output,
        ObjectKind::CompileTimeGenerator,
    )
}

/// Shared body of `defmacro`/`defgenerator`: registers a compile-time
/// definition with its own output buffer, emits the native entry-point
/// signature there, and evaluates the body into it. Nothing is emitted
/// into the module output; the definition is built and loaded by the
/// resolver when something requires it.
fn compile_time_definition_generator(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    _output: &mut GeneratorOutput,
    kind: ObjectKind,
) -> bool {
    let invocation_name = &tokens[invocation_index + 1];
    if !expect_module_scope(environment, context, invocation_name) {
        return false;
    }

    let name = &tokens[invocation_index + 2];
    if !expect_token_kind(environment, name, TokenKind::Symbol, "definition name") {
        return false;
    }
    let params_open = invocation_index + 3;
    if !expect_token_kind(
        environment,
        &tokens[params_open],
        TokenKind::OpenParen,
        "parameter list",
    ) {
        return false;
    }
    let body_start = find_close_paren_index(tokens, params_open) + 1;

    let definition_output = new_splice_buffer();
    let registered = environment.add_object_definition(ObjectDefinition {
        name: name.clone(),
        kind,
        output: Some(definition_output.clone()),
        is_required: false,
        is_loaded: false,
        references: HashMap::new(),
    });
    if !registered {
        return false;
    }

    let settings = NameStyleSettings::default();
    let c_name = lisp_name_to_c_name(settings.function_mode, &name.contents);
    let output_parameter = match kind {
        ObjectKind::CompileTimeMacro => "std::vector<Token>& output",
        _ => "GeneratorOutput& output",
    };
    let signature = format!(
        "bool {}(EvaluatorEnvironment& environment, const EvaluatorContext& context, \
         const std::vector<Token>& tokens, int startTokenIndex, {})",
        c_name, output_parameter
    );

    let num_errors = {
        let mut definition_buffer = definition_output.borrow_mut();
        add_string_output(
            &mut definition_buffer.source,
            signature,
            FormatMode::NewlineAfter,
            name,
        );
        add_string_output(&mut definition_buffer.source, "{", FormatMode::NewlineAfter, name);

        let body_context = context.with_definition(name.clone(), Scope::Body);
        let num_errors = evaluate_all(
            environment,
            &body_context,
            tokens,
            body_start,
            None,
            &mut definition_buffer,
        );

        add_string_output(&mut definition_buffer.source, "}", FormatMode::NewlineAfter, name);
        num_errors
    };

    num_errors == 0
}

/// `(var name type [initializer])`
///
/// Under hot reloading, module variables are reified as pointers so a
/// reloaded library keeps addressing the same state; reads and writes then
/// go through the dereference the evaluator emits for state variables.
fn var_generator(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let invocation_name = &tokens[invocation_index + 1];
    if !expect_module_scope(environment, context, invocation_name) {
        return false;
    }

    // Checked one token at a time: each index is only reachable while the
    // previous token was not the closing paren.
    let name = &tokens[invocation_index + 2];
    if !expect_token_kind(environment, name, TokenKind::Symbol, "variable name") {
        return false;
    }
    let type_token = &tokens[invocation_index + 3];
    if !expect_token_kind(environment, type_token, TokenKind::Symbol, "variable type") {
        return false;
    }

    let settings = NameStyleSettings::default();
    let converted_type = lisp_name_to_c_name(settings.variable_mode, &type_token.contents);

    if environment.hot_reload {
        environment.add_module_state_variable(&name.contents, name.clone());
        add_string_output(
            &mut output.source,
            format!("{}*", converted_type),
            FormatMode::None,
            type_token,
        );
        add_string_output(
            &mut output.source,
            &name.contents,
            FormatMode::ConvertVariableName,
            name,
        );
        add_lang_token_output(&mut output.source, FormatMode::EndStatement, name);
        return true;
    }

    add_string_output(&mut output.source, converted_type, FormatMode::None, type_token);
    add_string_output(
        &mut output.source,
        &name.contents,
        FormatMode::ConvertVariableName,
        name,
    );

    let initializer_index = invocation_index + 4;
    let mut num_errors = 0;
    if tokens[initializer_index].kind != TokenKind::CloseParen {
        add_string_output(&mut output.source, "=", FormatMode::None, name);
        let initializer_context = context.with_scope(Scope::ExpressionsOnly);
        num_errors = evaluate_form(
            environment,
            &initializer_context,
            tokens,
            initializer_index,
            output,
        );
    }

    add_lang_token_output(&mut output.source, FormatMode::EndStatement, name);
    num_errors == 0
}

/// Binary-style operators emit parenthesized infix: `(* 5 5)` → `(5 * 5)`.
fn infix_operator_generator(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
    invocation_index: usize,
    output: &mut GeneratorOutput,
) -> bool {
    let operator = &tokens[invocation_index + 1];
    if tokens[invocation_index + 2].kind == TokenKind::CloseParen {
        report_error_at_token(
            &environment.sources,
            ErrorKind::GeneratorFailure,
            operator,
            format!("operator {} requires arguments", operator.contents),
        );
        return false;
    }

    add_lang_token_output(&mut output.source, FormatMode::OpenParen, operator);

    let argument_context = context.with_scope(Scope::ExpressionsOnly);
    let delimiter = OutputFragment::Text {
        text: operator.contents.clone(),
        mode: FormatMode::None,
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

    add_lang_token_output(&mut output.source, FormatMode::CloseParen, operator);
    num_errors == 0
}
