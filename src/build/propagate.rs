//! Dependency propagation: growing `is_required` to its transitive closure.

use tracing::trace;

use crate::eval::Environment;

/// Marks every definition reachable from a required definition as required.
/// Runs whole passes until one changes nothing; `is_required` only ever
/// flips false→true, so this terminates within |definitions| passes.
pub fn propagate_required_to_references(environment: &mut Environment) {
    loop {
        let required_definitions: Vec<(String, Vec<String>)> = environment
            .definitions
            .iter()
            .filter(|(_, definition)| definition.is_required)
            .map(|(name, definition)| {
                (name.clone(), definition.references.keys().cloned().collect())
            })
            .collect();

        let mut num_changed = 0;
        for (definition_name, reference_names) in required_definitions {
            for reference_name in reference_names {
                if let Some(target) = environment.definitions.get_mut(&reference_name) {
                    if !target.is_required {
                        trace!(
                            target: "scone::propagation",
                            "{} requires {}", definition_name, reference_name
                        );
                        target.is_required = true;
                        num_changed += 1;
                    }
                }
            }
        }

        if num_changed == 0 {
            break;
        }
    }
}
