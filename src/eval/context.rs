//! Per-call evaluator state.

use std::sync::Arc;

use crate::syntax::Token;

/// What kind of forms are legal at the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Top level of a module: definitions and declarations.
    Module,
    /// Statement position inside a definition body.
    Body,
    /// Expression position: atoms and value-producing invocations only.
    ExpressionsOnly,
}

impl Scope {
    pub fn describe(self) -> &'static str {
        match self {
            Scope::Module => "module",
            Scope::Body => "body",
            Scope::ExpressionsOnly => "expressions-only",
        }
    }
}

/// Carried through every evaluation call; cheap to clone so deferred
/// reference sites can capture it.
#[derive(Debug, Clone)]
pub struct Context {
    pub scope: Scope,
    /// Name token of the enclosing definition, if any. References recorded
    /// while this is `None` at module scope belong to the `<global>`
    /// sentinel.
    pub definition_name: Option<Token>,
    /// Module this evaluation belongs to, for state variable lookups.
    pub module: Option<Arc<str>>,
}

impl Context {
    pub fn module_scope(module: Arc<str>) -> Self {
        Self {
            scope: Scope::Module,
            definition_name: None,
            module: Some(module),
        }
    }

    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    pub fn with_definition(&self, name: Token, scope: Scope) -> Self {
        Self {
            scope,
            definition_name: Some(name),
            module: self.module.clone(),
        }
    }
}
