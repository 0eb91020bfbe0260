//! Evaluator behaviour: atom emission, dispatch priority, macro expansion,
//! and definition-time collision rules.

mod common;

use common::{evaluate_module, test_environment};
use scone::converters::NameStyleSettings;
use scone::syntax::validate_parentheses;
use scone::writer::write_output_to_string;

#[test]
fn square_macro_expands_to_infix_multiplication() {
    let (mut environment, tokens, context) = test_environment("square.scn", "(square 5)");
    let (output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    let text = write_output_to_string(&output, &NameStyleSettings::default());
    assert!(text.contains("(5 * 5)"), "unexpected output: {text:?}");
}

#[test]
fn square_of_a_nested_form_copies_the_whole_form() {
    let (mut environment, tokens, context) =
        test_environment("square.scn", "(square (+ 1 2))");
    let (output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    let text = write_output_to_string(&output, &NameStyleSettings::default());
    assert!(text.contains("((1 + 2) * (1 + 2))"), "unexpected output: {text:?}");
}

#[test]
fn expansions_that_reach_evaluation_are_interned_and_balanced() {
    let (mut environment, tokens, context) = test_environment("square.scn", "(square 3)");
    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    assert_eq!(environment.macro_expansions.len(), 1);
    assert!(validate_parentheses(
        &environment.macro_expansions[0],
        &environment.sources
    ));
}

#[test]
fn known_functions_are_called_not_deferred() {
    let (mut environment, tokens, context) =
        test_environment("call.scn", "(defun f (x int))\n(f 1)");
    let (output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    // Dispatch saw the definition, so no reference was recorded.
    assert!(!environment.reference_pools.contains_key("f"));

    let text = write_output_to_string(&output, &NameStyleSettings::default());
    assert!(text.contains("void f(int x) {"), "unexpected output: {text:?}");
    assert!(text.contains("f(1)"), "unexpected output: {text:?}");
}

#[test]
fn unknown_invocations_defer_with_a_splice() {
    let (mut environment, tokens, context) = test_environment("defer.scn", "(later 1 2)");
    let (output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    assert_eq!(environment.reference_pools["later"].len(), 1);
    // The splice is in place but empty until the builder decides.
    let text = write_output_to_string(&output, &NameStyleSettings::default());
    assert!(!text.contains("later"), "nothing should be emitted yet: {text:?}");
}

#[test]
fn duplicate_definitions_are_rejected_citing_the_first() {
    let (mut environment, tokens, context) =
        test_environment("dup.scn", "(defun dup ())\n(defun dup ())");
    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 1);
    assert_eq!(environment.definitions["dup"].kind, scone::eval::ObjectKind::Function);
}

#[test]
fn definitions_shadowing_builtins_are_rejected() {
    let (mut environment, tokens, context) =
        test_environment("shadow.scn", "(defun square ())");
    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 1);
    assert!(!environment.definitions.contains_key("square"));
}

#[test]
fn atoms_outside_expression_scope_are_errors_but_evaluation_continues() {
    let (mut environment, tokens, context) =
        test_environment("scope.scn", "stray\n(defun f ())");
    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 1);
    // The later definition was still processed.
    assert!(environment.definitions.contains_key("f"));
}

#[test]
fn malformed_definition_forms_report_and_continue() {
    // Each truncated form is an error, never a panic, and evaluation keeps
    // going to surface the rest of the module.
    let source = "(var)\n(var x)\n(defun)\n(defmacro m)\n(defun ok ())";
    let (mut environment, tokens, context) = test_environment("short.scn", source);
    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 4);
    assert!(environment.definitions.contains_key("ok"));
}

#[test]
fn hot_reload_reifies_state_variables_as_pointers() {
    let source = "(var counter int 0)\n(show counter)";

    let (mut environment, tokens, context) = test_environment("hot.scn", source);
    environment.hot_reload = true;
    let (output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    let mut runner = common::StubProcessRunner::default();
    let mut loader = common::StubDynamicLoader::default();
    let mut tools = scone::build::BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: scone::build::BuildOptions::default(),
    };
    assert!(scone::build::resolve_all(&mut environment, &mut tools));

    let text = write_output_to_string(&output, &NameStyleSettings::default());
    assert!(text.contains("int* counter;"), "unexpected output: {text:?}");
    assert!(text.contains("show((* counter))"), "unexpected output: {text:?}");

    // Without hot reloading the variable is a plain definition.
    let (mut plain_environment, plain_tokens, plain_context) =
        test_environment("plain.scn", source);
    let (plain_output, plain_errors) =
        evaluate_module(&mut plain_environment, &plain_context, &plain_tokens);
    assert_eq!(plain_errors, 0);
    let plain_text = write_output_to_string(&plain_output, &NameStyleSettings::default());
    assert!(plain_text.contains("int counter = 0;"), "unexpected output: {plain_text:?}");
}

#[test]
fn literal_atoms_are_emitted_verbatim_and_names_are_converted() {
    let (mut environment, tokens, context) =
        test_environment("atoms.scn", "(f -1.5 'a' my-var \"text\")");
    // f is unknown; let the builder guess so the splice fills in.
    let (output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    let mut runner = common::StubProcessRunner::default();
    let mut loader = common::StubDynamicLoader::default();
    let mut tools = scone::build::BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: scone::build::BuildOptions::default(),
    };
    assert!(scone::build::resolve_all(&mut environment, &mut tools));

    let text = write_output_to_string(&output, &NameStyleSettings::default());
    assert!(text.contains("f(-1.5, 'a', my_var, \"text\")"), "unexpected output: {text:?}");
}
