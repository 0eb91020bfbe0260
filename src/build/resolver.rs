//! The fixed-point driver and the final audit.

use tracing::{debug, trace};

use crate::build::pipeline::{build_evaluate_references, BuildTools};
use crate::build::propagate::propagate_required_to_references;
use crate::diagnostics::{note_at_token, report, report_error_at_token, ErrorKind, SconeError};
use crate::eval::{Environment, GuessState};
use crate::syntax::Token;

/// Alternates dependency propagation and build passes until a pass resolves
/// nothing (quiescence) or fails, then audits the whole environment.
/// Returns true only if the audit is clean and no build errors occurred.
pub fn resolve_all(environment: &mut Environment, tools: &mut BuildTools) -> bool {
    let mut num_build_resolve_errors: u32 = 0;
    let mut num_passes = 0usize;
    loop {
        // Convergence requires every pass to load an object, resolve a
        // guess, or fail; a run that does none of those is stuck.
        let max_passes = 2 * environment.definitions.len() + 8;
        num_passes += 1;
        if num_passes > max_passes {
            report(SconeError::new(
                ErrorKind::Internal,
                format!(
                    "build fixed point did not converge after {} passes",
                    max_passes
                ),
            ));
            num_build_resolve_errors += 1;
            break;
        }

        propagate_required_to_references(environment);
        let num_references_resolved =
            build_evaluate_references(environment, tools, &mut num_build_resolve_errors);
        debug!(
            target: "scone::build",
            "pass {} resolved {} references", num_passes, num_references_resolved
        );
        if num_build_resolve_errors > 0 {
            break;
        }
        if num_references_resolved == 0 {
            break;
        }
    }

    // The audit only classifies what is left; it never evaluates further.
    let mut num_errors: u32 = 0;
    let definition_names: Vec<String> = environment.definitions.keys().cloned().collect();
    for definition_name in definition_names {
        let definition = &environment.definitions[&definition_name];
        if !definition.is_required {
            trace!(
                target: "scone::build",
                "{} omitted (not required by module)", definition_name
            );
            continue;
        }

        if definition.kind.is_compile_time() {
            if !environment.is_compile_time_code_loaded(definition) {
                report_error_at_token(
                    &environment.sources,
                    ErrorKind::UnresolvedReference,
                    &definition.name,
                    "failed to build required object",
                );
                num_errors += 1;
            }
            continue;
        }

        // Regular generated code: every reference must have been settled
        // one way or another, and none may point at a compile-time
        // definition that never loaded.
        let mut missing_definition_names: Vec<Token> = Vec::new();
        for status in definition.references.values() {
            if let Some(target) = environment.definitions.get(&status.name.contents) {
                if target.kind.is_compile_time() && !environment.is_compile_time_code_loaded(target)
                {
                    missing_definition_names.push(target.name.clone());
                    num_errors += 1;
                }
            }

            if status.guess_state == GuessState::None {
                report_error_at_token(
                    &environment.sources,
                    ErrorKind::UnresolvedReference,
                    &status.name,
                    "reference has not been resolved",
                );
                num_errors += 1;
            }
        }

        if !missing_definition_names.is_empty() {
            report_error_at_token(
                &environment.sources,
                ErrorKind::UnresolvedReference,
                &definition.name,
                format!("failed to generate {}", definition_name),
            );
            for missing_name in &missing_definition_names {
                note_at_token(missing_name, "missing compile-time function defined here");
            }
        }
    }

    num_errors == 0 && num_build_resolve_errors == 0
}
