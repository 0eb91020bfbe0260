//! Evaluation: environment, per-call context, and the recursive walk.

pub mod context;
pub mod environment;
pub mod evaluator;

pub use context::{Context, Scope};
pub use environment::{
    CompileTimeFunction, Environment, GeneratorFn, GuessState, MacroFn, ObjectDefinition,
    ObjectKind, ObjectReference, ReferenceStatus, GLOBAL_DEFINITION_NAME,
};
pub use evaluator::{evaluate_all, evaluate_form};
