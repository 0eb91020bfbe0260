//! The process-wide registry every stage of translation works against.
//!
//! The environment owns definitions, the reference graph, the compile-time
//! function registry (built-ins and loaded entries share one tagged map, so
//! dispatch is a single lookup), interned macro expansions, and the source
//! registry diagnostics draw from. Token vectors live behind `Arc` and are
//! never mutated after creation; handles into them stay valid until
//! teardown no matter how the containers around them grow.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error};

use crate::diagnostics::{note_at_token, report_error_at_token, ErrorKind, SourceRegistry};
use crate::eval::context::{Context, Scope};
use crate::output::{GeneratorOutput, SpliceBuffer};
use crate::syntax::{Token, TokenList};

/// Sentinel definition owning all top-level references.
pub const GLOBAL_DEFINITION_NAME: &str = "<global>";

/// Compile-time macro: produces a fresh token vector to be evaluated in
/// place of the invocation.
pub type MacroFn =
    fn(&mut Environment, &Context, &TokenList, usize, &mut Vec<Token>) -> bool;

/// Compile-time generator: writes output fragments directly.
pub type GeneratorFn =
    fn(&mut Environment, &Context, &TokenList, usize, &mut GeneratorOutput) -> bool;

/// One registry entry. Loaded library symbols are transmuted into the same
/// function pointer types the built-ins use, so lookups never care where an
/// entry came from.
#[derive(Clone, Copy)]
pub enum CompileTimeFunction {
    Macro(MacroFn),
    Generator(GeneratorFn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A runtime function: invocations become calls in the output.
    Function,
    CompileTimeMacro,
    CompileTimeGenerator,
}

impl ObjectKind {
    pub fn is_compile_time(self) -> bool {
        matches!(
            self,
            ObjectKind::CompileTimeMacro | ObjectKind::CompileTimeGenerator
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            ObjectKind::Function => "function",
            ObjectKind::CompileTimeMacro => "macro",
            ObjectKind::CompileTimeGenerator => "generator",
        }
    }
}

/// What the builder currently believes about an unresolved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessState {
    /// Nothing decided yet.
    None,
    /// Speculatively emitted as a runtime function call.
    Guessed,
    /// Known compile-time definition that has not been loaded yet.
    WaitingForLoad,
    Resolved,
}

/// One place a name is referenced: the invocation's tokens, its open paren
/// index, the captured context, and the splice buffer the eventual
/// expansion writes into. Clones share the splice through `Rc`.
#[derive(Clone)]
pub struct ObjectReference {
    pub tokens: TokenList,
    pub start_index: usize,
    pub context: Context,
    pub splice_output: SpliceBuffer,
    pub is_resolved: bool,
}

/// Per-(definition, referenced-name) record.
pub struct ReferenceStatus {
    pub name: Token,
    pub guess_state: GuessState,
    pub sites: Vec<ObjectReference>,
}

pub struct ObjectDefinition {
    pub name: Token,
    pub kind: ObjectKind,
    /// Compile-time definitions carry their transpiled form here; runtime
    /// functions emit inline into the module output instead.
    pub output: Option<SpliceBuffer>,
    pub is_required: bool,
    pub is_loaded: bool,
    pub references: HashMap<String, ReferenceStatus>,
}

pub struct Environment {
    pub definitions: HashMap<String, ObjectDefinition>,
    /// Every site mentioning a name, across all definitions, for fast
    /// lookup at resolve time. The pool copy carries the authoritative
    /// `is_resolved` flag.
    pub reference_pools: HashMap<String, Vec<ObjectReference>>,
    compile_time: HashMap<String, CompileTimeFunction>,
    pub module_state_variables: HashMap<String, Token>,
    /// Interned macro expansions. Never freed before teardown: diagnostics
    /// and captured reference sites may point into them even after errors.
    pub macro_expansions: Vec<TokenList>,
    pub sources: SourceRegistry,
    pub working_dir: PathBuf,
    pub hot_reload: bool,
    next_build_id: u32,
}

impl Environment {
    pub fn new() -> Self {
        let mut environment = Self {
            definitions: HashMap::new(),
            reference_pools: HashMap::new(),
            compile_time: HashMap::new(),
            module_state_variables: HashMap::new(),
            macro_expansions: Vec::new(),
            sources: SourceRegistry::new(),
            working_dir: PathBuf::from("scone_cache"),
            hot_reload: false,
            next_build_id: 0,
        };

        // The implicit top-level root. Required from the start so
        // propagation has somewhere to grow from.
        environment.definitions.insert(
            GLOBAL_DEFINITION_NAME.to_string(),
            ObjectDefinition {
                name: Token::internal(GLOBAL_DEFINITION_NAME),
                kind: ObjectKind::Function,
                output: None,
                is_required: true,
                is_loaded: false,
                references: HashMap::new(),
            },
        );

        environment
    }

    pub fn find_macro(&self, name: &str) -> Option<MacroFn> {
        match self.compile_time.get(name) {
            Some(CompileTimeFunction::Macro(function)) => Some(*function),
            _ => None,
        }
    }

    pub fn find_generator(&self, name: &str) -> Option<GeneratorFn> {
        match self.compile_time.get(name) {
            Some(CompileTimeFunction::Generator(function)) => Some(*function),
            _ => None,
        }
    }

    pub fn has_compile_time_function(&self, name: &str) -> bool {
        self.compile_time.contains_key(name)
    }

    pub fn register_macro(&mut self, name: &str, function: MacroFn) {
        self.compile_time
            .insert(name.to_string(), CompileTimeFunction::Macro(function));
    }

    pub fn register_generator(&mut self, name: &str, function: GeneratorFn) {
        self.compile_time
            .insert(name.to_string(), CompileTimeFunction::Generator(function));
    }

    pub fn install_compile_time_function(&mut self, name: &str, function: CompileTimeFunction) {
        self.compile_time.insert(name.to_string(), function);
    }

    /// Whether the native entry point backing a compile-time definition is
    /// installed under the matching tag.
    pub fn is_compile_time_code_loaded(&self, definition: &ObjectDefinition) -> bool {
        match definition.kind {
            ObjectKind::CompileTimeMacro => self.find_macro(&definition.name.contents).is_some(),
            ObjectKind::CompileTimeGenerator => {
                self.find_generator(&definition.name.contents).is_some()
            }
            ObjectKind::Function => false,
        }
    }

    /// Registers a definition. A name may have at most one definition and
    /// must not collide with a built-in macro or generator; both failures
    /// are reported here and evaluation continues.
    pub fn add_object_definition(&mut self, definition: ObjectDefinition) -> bool {
        let name = definition.name.contents.clone();

        if let Some(existing) = self.definitions.get(&name) {
            report_error_at_token(
                &self.sources,
                ErrorKind::DuplicateDefinition,
                &definition.name,
                format!("multiple definitions of {}", name),
            );
            note_at_token(&existing.name, "first defined here");
            return false;
        }

        if self.has_compile_time_function(&name) {
            report_error_at_token(
                &self.sources,
                ErrorKind::BuiltinShadowed,
                &definition.name,
                format!(
                    "multiple definitions of {}. Name may be conflicting with a built-in macro or generator",
                    name
                ),
            );
            return false;
        }

        self.definitions.insert(name, definition);
        true
    }

    /// Records a reference under its enclosing definition and in the global
    /// pool. Returns the status's guess state after insertion, or `None` if
    /// the enclosing definition could not be found at all.
    pub fn add_object_reference(
        &mut self,
        name_token: &Token,
        reference: ObjectReference,
    ) -> Option<GuessState> {
        let definition_name = match &reference.context.definition_name {
            Some(name) => name.contents.clone(),
            None => {
                if reference.context.scope != Scope::Module {
                    error!(
                        target: "scone::references",
                        "reference to {} has no enclosing definition outside module scope",
                        name_token.contents
                    );
                }
                GLOBAL_DEFINITION_NAME.to_string()
            }
        };

        debug!(
            target: "scone::references",
            "adding reference {} to {}", name_token.contents, definition_name
        );

        let state = match self.definitions.get_mut(&definition_name) {
            Some(definition) => {
                let status = definition
                    .references
                    .entry(name_token.contents.clone())
                    .or_insert_with(|| ReferenceStatus {
                        name: name_token.clone(),
                        guess_state: GuessState::None,
                        sites: Vec::new(),
                    });
                status.sites.push(reference.clone());
                Some(status.guess_state)
            }
            None => {
                if definition_name == GLOBAL_DEFINITION_NAME {
                    report_error_at_token(
                        &self.sources,
                        ErrorKind::Internal,
                        name_token,
                        format!(
                            "expected {} definition to exist as a top-level catch-all",
                            GLOBAL_DEFINITION_NAME
                        ),
                    );
                } else {
                    report_error_at_token(
                        &self.sources,
                        ErrorKind::Internal,
                        name_token,
                        format!(
                            "expected definition {} to already exist; the reference graph is broken",
                            definition_name
                        ),
                    );
                }
                None
            }
        };

        self.reference_pools
            .entry(name_token.contents.clone())
            .or_default()
            .push(reference);

        state
    }

    /// Takes ownership of a macro expansion forever. Even failed expansions
    /// stay interned, since already-captured token handles and diagnostics
    /// may point into them.
    pub fn intern_expansion(&mut self, tokens: Vec<Token>) -> TokenList {
        let interned: TokenList = Arc::new(tokens);
        self.macro_expansions.push(interned.clone());
        interned
    }

    pub fn next_build_id(&mut self) -> u32 {
        self.next_build_id += 1;
        self.next_build_id
    }

    pub fn add_module_state_variable(&mut self, name: &str, token: Token) {
        self.module_state_variables.insert(name.to_string(), token);
    }

    pub fn find_module_state_variable(&self, name: &str) -> Option<&Token> {
        self.module_state_variables.get(name)
    }

    /// Single explicit teardown step. Outstanding `Arc`/`Rc` handles stay
    /// valid; this just releases the environment's own ownership.
    pub fn teardown(&mut self) {
        self.reference_pools.clear();
        self.definitions.clear();
        self.macro_expansions.clear();
        self.module_state_variables.clear();
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::new_splice_buffer;
    use crate::syntax::TokenKind;

    fn definition_named(name: &str, kind: ObjectKind) -> ObjectDefinition {
        ObjectDefinition {
            name: Token::internal(name),
            kind,
            output: None,
            is_required: false,
            is_loaded: false,
            references: HashMap::new(),
        }
    }

    fn reference_at(tokens: &TokenList, index: usize, context: &Context) -> ObjectReference {
        ObjectReference {
            tokens: tokens.clone(),
            start_index: index,
            context: context.clone(),
            splice_output: new_splice_buffer(),
            is_resolved: false,
        }
    }

    #[test]
    fn rejects_duplicate_definitions() {
        let mut environment = Environment::new();
        assert!(environment.add_object_definition(definition_named("dup", ObjectKind::Function)));
        assert!(!environment.add_object_definition(definition_named("dup", ObjectKind::Function)));
    }

    #[test]
    fn rejects_definitions_shadowing_builtins() {
        fn noop(
            _: &mut Environment,
            _: &Context,
            _: &TokenList,
            _: usize,
            _: &mut GeneratorOutput,
        ) -> bool {
            true
        }
        let mut environment = Environment::new();
        environment.register_generator("defun", noop);
        assert!(!environment.add_object_definition(definition_named("defun", ObjectKind::Function)));
    }

    #[test]
    fn references_land_in_definition_and_pool() {
        let mut environment = Environment::new();
        let tokens: TokenList = Arc::new(vec![Token::internal("(")]);
        let context = Context::module_scope(Arc::from("m.scn"));
        let name = Token {
            kind: TokenKind::Symbol,
            ..Token::internal("callee")
        };

        let state = environment.add_object_reference(&name, reference_at(&tokens, 0, &context));
        assert_eq!(state, Some(GuessState::None));

        let global = &environment.definitions[GLOBAL_DEFINITION_NAME];
        assert_eq!(global.references["callee"].sites.len(), 1);
        assert_eq!(environment.reference_pools["callee"].len(), 1);

        // A second site appends and preserves the guess state.
        environment.definitions.get_mut(GLOBAL_DEFINITION_NAME).unwrap()
            .references
            .get_mut("callee")
            .unwrap()
            .guess_state = GuessState::Guessed;
        let state = environment.add_object_reference(&name, reference_at(&tokens, 0, &context));
        assert_eq!(state, Some(GuessState::Guessed));
        assert_eq!(environment.reference_pools["callee"].len(), 2);
    }

    #[test]
    fn token_handles_survive_environment_growth_and_teardown() {
        let mut environment = Environment::new();
        let expansion = environment.intern_expansion(vec![Token::internal("kept")]);
        let handle = expansion.clone();

        for index in 0..64 {
            environment.intern_expansion(vec![Token::internal(format!("filler{}", index))]);
            environment.add_object_definition(definition_named(
                &format!("def{}", index),
                ObjectKind::Function,
            ));
        }
        environment.teardown();

        assert_eq!(handle[0].contents, "kept");
    }
}
