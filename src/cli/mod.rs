//! The command-line driver: read, tokenize, validate, evaluate, resolve,
//! write.

pub mod args;

use std::fs;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::build::{resolve_all, BuildOptions, BuildTools, SystemProcessRunner};
use crate::cli::args::SconeArgs;
use crate::diagnostics::{report, SconeError};
use crate::eval::{evaluate_all, Context, Environment};
use crate::generators::{register_fundamental_generators, square_macro};
use crate::output::{FormatMode, GeneratorOutput, OutputFragment};
use crate::syntax::{tokenize_line, validate_parentheses, Token, TokenList};
use crate::writer::{write_generator_output, WriterOutputSettings};

/// Runs the transpiler and returns the process exit code: 0 on full
/// success, 1 on any failure before output is written.
pub fn run() -> i32 {
    let arguments = match SconeArgs::try_parse() {
        Ok(arguments) => arguments,
        Err(error) => {
            let _ = error.print();
            return if error.use_stderr() { 1 } else { 0 };
        }
    };

    let default_filter = if arguments.verbose {
        "scone=debug"
    } else {
        "scone=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run_file(&arguments) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(error) => {
            report(error);
            1
        }
    }
}

fn run_file(arguments: &SconeArgs) -> Result<bool, SconeError> {
    let source_name: Arc<str> = Arc::from(arguments.file.to_string_lossy().as_ref());
    let content = Arc::new(
        fs::read_to_string(&arguments.file)
            .map_err(|error| SconeError::io(format!("could not open {}", source_name), error))?,
    );

    // The token vector is created once and never touched again; every
    // downstream stage holds handles into it.
    let tokens: TokenList = {
        let mut tokens: Vec<Token> = Vec::new();
        let mut line_offset = 0;
        for (line_index, line) in content.split('\n').enumerate() {
            tokenize_line(
                line,
                &source_name,
                line_index as u32 + 1,
                line_offset,
                &mut tokens,
            )?;
            line_offset += line.len() + 1;
        }
        Arc::new(tokens)
    };

    let mut environment = Environment::new();
    environment.working_dir = arguments.cache_dir.clone();
    environment.hot_reload = arguments.hot_reload;
    environment
        .sources
        .register(source_name.clone(), content.clone());

    if !validate_parentheses(&tokens, &environment.sources) {
        return Ok(false);
    }

    register_fundamental_generators(&mut environment);
    environment.register_macro("square", square_macro);

    let module_context = Context::module_scope(source_name.clone());
    let mut output = GeneratorOutput::new();
    let body_delimiter = OutputFragment::Text {
        text: String::new(),
        mode: FormatMode::NewlineAfter,
        origin: None,
    };
    let num_errors = evaluate_all(
        &mut environment,
        &module_context,
        &tokens,
        0,
        Some(&body_delimiter),
        &mut output,
    );
    if num_errors > 0 {
        environment.teardown();
        return Ok(false);
    }

    let mut runner = SystemProcessRunner::new();
    #[cfg(unix)]
    let mut loader = crate::build::SystemDynamicLoader::new();
    #[cfg(not(unix))]
    compile_error!("the compile-time loader requires a unix dynamic linker");

    let mut tools = BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: BuildOptions {
            compiler: arguments.compiler.clone(),
            max_processes: arguments.max_processes,
        },
    };
    if !resolve_all(&mut environment, &mut tools) {
        environment.teardown();
        return Ok(false);
    }

    let writer_settings = WriterOutputSettings {
        source_output_path: arguments.file.with_extension("cpp"),
        header_output_path: Some(arguments.file.with_extension("hpp")),
        source_heading: None,
        source_footer: None,
    };
    let result = write_generator_output(
        &output,
        &crate::converters::NameStyleSettings::default(),
        &writer_settings,
    );

    environment.teardown();
    result.map(|_| true)
}
