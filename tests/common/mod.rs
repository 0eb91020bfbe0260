//! Shared fixtures: a process runner that fabricates artifacts while
//! recording spawn patterns, a loader that hands out Rust fn pointers, and
//! tokenizing/evaluating helpers.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scone::build::{DynamicLoader, LibraryHandle, ProcessRunner, RunRequest};
use scone::diagnostics::SconeError;
use scone::eval::{evaluate_all, Context, Environment, GeneratorFn, MacroFn};
use scone::generators::{register_fundamental_generators, square_macro};
use scone::output::{FormatMode, GeneratorOutput, OutputFragment};
use scone::syntax::{tokenize_line, Token, TokenList};

/// Records every spawn, tracks the concurrency high-water mark, and on
/// drain reports success after creating whatever file the command's `-o`
/// argument names, so mtime-based caching sees real artifacts.
#[derive(Default)]
pub struct StubProcessRunner {
    pending: Vec<RunRequest>,
    pub spawned: Vec<RunRequest>,
    pub max_concurrent: usize,
}

impl ProcessRunner for StubProcessRunner {
    fn run(&mut self, request: RunRequest) -> Result<(), SconeError> {
        self.pending.push(request.clone());
        self.spawned.push(request);
        self.max_concurrent = self.max_concurrent.max(self.pending.len());
        Ok(())
    }

    fn wait_all(&mut self, _on_output: &mut dyn FnMut(&str)) -> Vec<(usize, i32)> {
        self.pending
            .drain(..)
            .map(|request| {
                if let Some(position) = request.arguments.iter().position(|arg| arg == "-o") {
                    if let Some(path) = request.arguments.get(position + 1) {
                        std::fs::write(path, b"artifact").unwrap();
                    }
                }
                (request.key, 0)
            })
            .collect()
    }
}

/// Resolves symbols against maps of real Rust functions, standing in for a
/// dynamic linker.
#[derive(Default)]
pub struct StubDynamicLoader {
    pub macros: HashMap<String, MacroFn>,
    pub generators: HashMap<String, GeneratorFn>,
    pub loads: Vec<PathBuf>,
}

impl StubDynamicLoader {
    pub fn with_macro(mut self, symbol: &str, function: MacroFn) -> Self {
        self.macros.insert(symbol.to_string(), function);
        self
    }

    #[allow(dead_code)]
    pub fn with_generator(mut self, symbol: &str, function: GeneratorFn) -> Self {
        self.generators.insert(symbol.to_string(), function);
        self
    }
}

impl DynamicLoader for StubDynamicLoader {
    fn load(&mut self, path: &Path) -> Option<LibraryHandle> {
        self.loads.push(path.to_path_buf());
        Some(LibraryHandle(self.loads.len() - 1))
    }

    fn lookup(&mut self, _handle: LibraryHandle, symbol: &str) -> Option<*const ()> {
        if let Some(function) = self.macros.get(symbol) {
            return Some(*function as *const ());
        }
        if let Some(function) = self.generators.get(symbol) {
            return Some(*function as *const ());
        }
        None
    }
}

pub fn tokenize_source(name: &str, text: &str) -> (Arc<str>, Arc<String>, TokenList) {
    let source_name: Arc<str> = Arc::from(name);
    let content = Arc::new(text.to_string());
    let mut tokens: Vec<Token> = Vec::new();
    let mut line_offset = 0;
    for (line_index, line) in text.split('\n').enumerate() {
        tokenize_line(line, &source_name, line_index as u32 + 1, line_offset, &mut tokens)
            .expect("test sources must lex");
        line_offset += line.len() + 1;
    }
    (source_name, content, Arc::new(tokens))
}

/// An environment with fundamental generators and the sample macro
/// registered, the way the driver sets one up.
pub fn test_environment(name: &str, text: &str) -> (Environment, TokenList, Context) {
    let (source_name, content, tokens) = tokenize_source(name, text);
    let mut environment = Environment::new();
    environment.sources.register(source_name.clone(), content);
    register_fundamental_generators(&mut environment);
    environment.register_macro("square", square_macro);
    let context = Context::module_scope(source_name);
    (environment, tokens, context)
}

/// Evaluates the whole module with the driver's newline delimiter.
pub fn evaluate_module(
    environment: &mut Environment,
    context: &Context,
    tokens: &TokenList,
) -> (GeneratorOutput, u32) {
    let mut output = GeneratorOutput::new();
    let delimiter = OutputFragment::Text {
        text: String::new(),
        mode: FormatMode::NewlineAfter,
        origin: None,
    };
    let num_errors = evaluate_all(environment, context, tokens, 0, Some(&delimiter), &mut output);
    (output, num_errors)
}

/// A macro body for stubs: expands to the tokens of `text`, stamped with
/// the invocation's provenance.
pub fn expand_text(text: &str, template: &Token, output: &mut Vec<Token>) -> bool {
    tokenize_line(text, &template.source, template.line, 0, output).is_ok()
}
