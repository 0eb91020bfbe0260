//! The compile-time build pipeline.
//!
//! One pass: pick the required-but-unloaded definitions, classify their
//! references (guessing unknown names as runtime calls), then for the
//! buildable compile-time objects run transpile → compile → link → load and
//! finally re-evaluate every deferred site that was waiting on the newly
//! loaded name. Compile and link processes run in parallel up to a cap;
//! `wait_all` is the only ordering barrier.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::build::loader::DynamicLoader;
use crate::build::process::{ProcessRunner, RunRequest};
use crate::converters::{lisp_name_to_c_name, NameStyleSettings};
use crate::diagnostics::{report, report_error_at_token, ErrorKind, SconeError};
use crate::eval::environment::CompileTimeFunction;
use crate::eval::{evaluate_form, Environment, GeneratorFn, GuessState, MacroFn};
use crate::generators::function_invocation_generator;
use crate::writer::{write_if_changed, write_output_to_string};

/// Heading compiled-in front of every transpiled compile-time macro. The
/// entry point signature itself is emitted by `defmacro`.
const MACRO_SOURCE_HEADING: &str = "#include \"Evaluator.hpp\"\n\
                                    #include \"EvaluatorEnums.hpp\"\n\
                                    #include \"Tokenizer.hpp\"\n\
                                    \n\
                                    extern \"C\"\n{\n";
const MACRO_SOURCE_FOOTER: &str = "}\n";

const GENERATOR_SOURCE_HEADING: &str = "#include \"Evaluator.hpp\"\n\
                                        #include \"GeneratorHelpers.hpp\"\n\
                                        #include \"Tokenizer.hpp\"\n\
                                        \n\
                                        extern \"C\"\n{\n";
const GENERATOR_SOURCE_FOOTER: &str = "}\n";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub compiler: PathBuf,
    pub max_processes: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from("/usr/bin/clang++"),
            max_processes: 8,
        }
    }
}

/// The external collaborators a build pass drives.
pub struct BuildTools<'a> {
    pub runner: &'a mut dyn ProcessRunner,
    pub loader: &'a mut dyn DynamicLoader,
    pub options: BuildOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildStage {
    None,
    Compiling,
    Linking,
    Loading,
    ResolvingReferences,
    Finished,
}

struct BuildObject {
    build_id: u32,
    status: i32,
    stage: BuildStage,
    definition_name: String,
    source_path: PathBuf,
    object_path: PathBuf,
    library_path: PathBuf,
}

impl BuildObject {
    fn new(build_id: u32, definition_name: String) -> Self {
        Self {
            build_id,
            status: -1,
            stage: BuildStage::None,
            definition_name,
            source_path: PathBuf::new(),
            object_path: PathBuf::new(),
            library_path: PathBuf::new(),
        }
    }
}

struct Classification {
    can_build: bool,
    has_relevant_change: bool,
    has_guessed_refs: bool,
}

/// True when `file` must be considered dirtier than `reference`: newer, or
/// either side is missing.
fn file_is_more_recently_modified(file: &Path, reference: &Path) -> bool {
    let (Ok(file_meta), Ok(reference_meta)) = (fs::metadata(file), fs::metadata(reference)) else {
        return true;
    };
    match (file_meta.modified(), reference_meta.modified()) {
        (Ok(file_time), Ok(reference_time)) => file_time > reference_time,
        _ => true,
    }
}

fn set_guess_state(
    environment: &mut Environment,
    definition_name: &str,
    reference_name: &str,
    state: GuessState,
) {
    if let Some(status) = environment
        .definitions
        .get_mut(definition_name)
        .and_then(|definition| definition.references.get_mut(reference_name))
    {
        status.guess_state = state;
    }
}

fn current_guess_state(
    environment: &Environment,
    definition_name: &str,
    reference_name: &str,
) -> GuessState {
    environment
        .definitions
        .get(definition_name)
        .and_then(|definition| definition.references.get(reference_name))
        .map(|status| status.guess_state)
        .unwrap_or(GuessState::None)
}

/// Runs the function-invocation generator into the splice buffer of every
/// site of (definition, reference). Iterates by live index: speculative
/// emission can append new sites to the very list being walked.
fn emit_call_at_sites(
    environment: &mut Environment,
    definition_name: &str,
    reference_name: &str,
) -> bool {
    let mut all_succeeded = true;
    let mut site_index = 0;
    loop {
        let site = match environment
            .definitions
            .get(definition_name)
            .and_then(|definition| definition.references.get(reference_name))
            .and_then(|status| status.sites.get(site_index))
        {
            Some(site) => site.clone(),
            None => break,
        };

        let succeeded = {
            let mut splice = site.splice_output.borrow_mut();
            function_invocation_generator(
                environment,
                &site.context,
                &site.tokens,
                site.start_index,
                &mut splice,
            )
        };
        if !succeeded {
            all_succeeded = false;
        }
        site_index += 1;
    }
    all_succeeded
}

/// Classifies every reference of one candidate definition, repeating until
/// a pass makes no new guesses (guessing can itself create references).
fn classify_references(environment: &mut Environment, definition_name: &str) -> Classification {
    let mut classification = Classification {
        can_build: true,
        has_relevant_change: false,
        has_guessed_refs: false,
    };

    loop {
        let mut guess_dirtied_references = false;

        let reference_names: Vec<String> = match environment.definitions.get(definition_name) {
            Some(definition) => definition.references.keys().cloned().collect(),
            None => break,
        };

        for reference_name in reference_names {
            let target = environment
                .definitions
                .get(&reference_name)
                .map(|definition| (definition.kind, definition.is_loaded));
            let state = current_guess_state(environment, definition_name, &reference_name);

            match target {
                Some((kind, is_loaded)) if kind.is_compile_time() => {
                    if is_loaded {
                        // Loaded objects resolve references immediately; we
                        // react if the last thing we did was guess wrong.
                        if state != GuessState::Resolved {
                            debug!(
                                target: "scone::build",
                                "{}: required code {} has been loaded",
                                definition_name, reference_name
                            );
                            classification.has_relevant_change = true;
                        }
                        set_guess_state(
                            environment,
                            definition_name,
                            &reference_name,
                            GuessState::Resolved,
                        );
                    } else {
                        // A known compile-time function that is missing;
                        // never guess these.
                        debug!(
                            target: "scone::build",
                            "{}: cannot build until {} is loaded",
                            definition_name, reference_name
                        );
                        set_guess_state(
                            environment,
                            definition_name,
                            &reference_name,
                            GuessState::WaitingForLoad,
                        );
                        classification.can_build = false;
                    }
                }
                Some(_) => {
                    // A known runtime function call.
                    if state != GuessState::Resolved {
                        if !emit_call_at_sites(environment, definition_name, &reference_name) {
                            classification.can_build = false;
                        }
                        set_guess_state(
                            environment,
                            definition_name,
                            &reference_name,
                            GuessState::Resolved,
                        );
                    }
                }
                None => match state {
                    GuessState::None => {
                        debug!(
                            target: "scone::build",
                            "{}: guessing {} is a runtime function",
                            definition_name, reference_name
                        );
                        if !emit_call_at_sites(environment, definition_name, &reference_name) {
                            classification.can_build = false;
                        }
                        set_guess_state(
                            environment,
                            definition_name,
                            &reference_name,
                            GuessState::Guessed,
                        );
                        classification.has_relevant_change = true;
                        classification.has_guessed_refs = true;
                        guess_dirtied_references = true;
                    }
                    GuessState::Guessed => {
                        // Guessed before, and still not in definitions.
                        classification.has_guessed_refs = true;
                    }
                    _ => {}
                },
            }
        }

        if !guess_dirtied_references {
            break;
        }
    }

    classification
}

fn drain_processes(runner: &mut dyn ProcessRunner, build_objects: &mut [BuildObject]) {
    let statuses = runner.wait_all(&mut |line| debug!(target: "scone::build", "{}", line));
    for (key, status) in statuses {
        if let Some(build_object) = build_objects.get_mut(key) {
            build_object.status = status;
        }
    }
}

/// One build pass. Returns the number of deferred reference sites resolved;
/// evaluation errors during resolution are added to `num_errors_out`.
pub fn build_evaluate_references(
    environment: &mut Environment,
    tools: &mut BuildTools,
    num_errors_out: &mut u32,
) -> u32 {
    // Names are snapshotted up front: evaluation during resolution can add
    // definitions, and nothing may iterate the live map across that.
    // Sorted so build ids are assigned in a stable order run to run.
    let mut candidates: Vec<String> = environment
        .definitions
        .iter()
        .filter(|(_, definition)| definition.is_required && !definition.is_loaded)
        .map(|(name, _)| name.clone())
        .collect();
    candidates.sort();

    let mut build_objects: Vec<BuildObject> = Vec::new();
    for candidate_name in candidates {
        debug!(target: "scone::build", "checking to build {}", candidate_name);
        let classification = classify_references(environment, &candidate_name);

        // hasRelevantChange false suppresses rebuilding compile-time
        // functions whose unresolved names have not changed since last
        // pass. Runtime functions go through classification too (their
        // calls need emitting) but are never built.
        let is_compile_time = environment
            .definitions
            .get(&candidate_name)
            .is_some_and(|definition| definition.kind.is_compile_time());
        if classification.can_build
            && (!classification.has_guessed_refs || classification.has_relevant_change)
            && is_compile_time
        {
            let build_id = environment.next_build_id();
            build_objects.push(BuildObject::new(build_id, candidate_name));
        }
    }

    if build_objects.is_empty() {
        return 0;
    }

    if let Err(io_error) = fs::create_dir_all(&environment.working_dir) {
        report(SconeError::io(
            format!(
                "failed to create working directory {}",
                environment.working_dir.display()
            ),
            io_error,
        ));
        *num_errors_out += 1;
        return 0;
    }

    let settings = NameStyleSettings::default();
    let max_processes = tools.options.max_processes.max(1);
    let mut num_processes_spawned = 0;

    // Transpile, then spawn compiles in capped waves.
    for index in 0..build_objects.len() {
        let definition = &environment.definitions[&build_objects[index].definition_name];
        debug!(
            target: "scone::build",
            "build {} (id {})", definition.name.contents, build_objects[index].build_id
        );

        let converted_name = lisp_name_to_c_name(settings.artifact_mode, &definition.name.contents);
        // Distinct lisp names can convert to one c name; the build id keeps
        // their artifacts apart on disk.
        let name_collides = environment.definitions.iter().any(|(other_name, other)| {
            other_name != &build_objects[index].definition_name
                && other.kind.is_compile_time()
                && lisp_name_to_c_name(settings.artifact_mode, &other.name.contents)
                    == converted_name
        });
        let artifacts_name = if name_collides {
            format!("comptime_{}_{}", converted_name, build_objects[index].build_id)
        } else {
            format!("comptime_{}", converted_name)
        };
        build_objects[index].source_path = environment
            .working_dir
            .join(format!("{}.cpp", artifacts_name));
        build_objects[index].object_path =
            environment.working_dir.join(format!("{}.o", artifacts_name));
        build_objects[index].library_path = environment
            .working_dir
            .join(format!("lib{}.so", artifacts_name));

        let (heading, footer) = match definition.kind {
            crate::eval::ObjectKind::CompileTimeGenerator => {
                (GENERATOR_SOURCE_HEADING, GENERATOR_SOURCE_FOOTER)
            }
            _ => (MACRO_SOURCE_HEADING, MACRO_SOURCE_FOOTER),
        };
        let Some(definition_output) = &definition.output else {
            report_error_at_token(
                &environment.sources,
                ErrorKind::Internal,
                &definition.name,
                "compile-time definition has no output buffer",
            );
            continue;
        };

        let mut content = String::from(heading);
        content.push_str(&write_output_to_string(
            &definition_output.borrow(),
            &settings,
        ));
        content.push_str(footer);

        // Written only when changed, so an untouched definition keeps its
        // mtime and the cache check below can actually hit.
        if let Err(io_error) = write_if_changed(&build_objects[index].source_path, &content) {
            report_error_at_token(
                &environment.sources,
                ErrorKind::Toolchain,
                &definition.name,
                format!("failed to write compile-time source file: {}", io_error),
            );
            continue;
        }

        build_objects[index].stage = BuildStage::Compiling;

        if !file_is_more_recently_modified(
            &build_objects[index].source_path,
            &build_objects[index].library_path,
        ) {
            debug!(
                target: "scone::build",
                "skipping compiling {} (using cached library)",
                build_objects[index].source_path.display()
            );
            // Straight to linking, which immediately becomes loading.
            build_objects[index].stage = BuildStage::Linking;
            build_objects[index].status = 0;
            continue;
        }

        let request = RunRequest {
            key: index,
            executable: tools.options.compiler.clone(),
            arguments: vec![
                "-g".to_string(),
                "-c".to_string(),
                build_objects[index].source_path.to_string_lossy().into_owned(),
                "-o".to_string(),
                build_objects[index].object_path.to_string_lossy().into_owned(),
                "-fPIC".to_string(),
            ],
        };
        if let Err(spawn_error) = tools.runner.run(request) {
            report(spawn_error);
            continue;
        }

        num_processes_spawned += 1;
        if num_processes_spawned >= max_processes {
            drain_processes(tools.runner, &mut build_objects);
            num_processes_spawned = 0;
        }
    }

    drain_processes(tools.runner, &mut build_objects);

    // Link everything that compiled.
    let mut num_link_processes = 0;
    for index in 0..build_objects.len() {
        if build_objects[index].stage != BuildStage::Compiling {
            continue;
        }
        let definition_name_token = environment.definitions
            [&build_objects[index].definition_name]
            .name
            .clone();

        if build_objects[index].status != 0 {
            report_error_at_token(
                &environment.sources,
                ErrorKind::Toolchain,
                &definition_name_token,
                format!(
                    "failed to compile definition '{}' with status {}",
                    build_objects[index].definition_name, build_objects[index].status
                ),
            );
            continue;
        }

        build_objects[index].stage = BuildStage::Linking;
        build_objects[index].status = -1;
        debug!(
            target: "scone::build",
            "compiled {} successfully", build_objects[index].definition_name
        );

        let request = RunRequest {
            key: index,
            executable: tools.options.compiler.clone(),
            arguments: vec![
                "-shared".to_string(),
                "-o".to_string(),
                build_objects[index].library_path.to_string_lossy().into_owned(),
                build_objects[index].object_path.to_string_lossy().into_owned(),
            ],
        };
        if let Err(spawn_error) = tools.runner.run(request) {
            report(spawn_error);
            continue;
        }
        num_link_processes += 1;
        if num_link_processes >= max_processes {
            drain_processes(tools.runner, &mut build_objects);
            num_link_processes = 0;
        }
    }

    drain_processes(tools.runner, &mut build_objects);

    // Load and resolve dependents.
    let mut num_references_resolved = 0;
    for index in 0..build_objects.len() {
        if build_objects[index].stage != BuildStage::Linking {
            continue;
        }
        let definition_name = build_objects[index].definition_name.clone();
        let definition_name_token = environment.definitions[&definition_name].name.clone();
        let definition_kind = environment.definitions[&definition_name].kind;

        if build_objects[index].status != 0 {
            report_error_at_token(
                &environment.sources,
                ErrorKind::Toolchain,
                &definition_name_token,
                "failed to link definition",
            );
            continue;
        }

        build_objects[index].stage = BuildStage::Loading;
        debug!(target: "scone::build", "linked {} successfully", definition_name);

        let Some(library) = tools.loader.load(&build_objects[index].library_path) else {
            report_error_at_token(
                &environment.sources,
                ErrorKind::Toolchain,
                &definition_name_token,
                "failed to load compile-time library",
            );
            continue;
        };

        // Loaded symbols are named in the converted function style.
        let symbol_name =
            lisp_name_to_c_name(settings.function_mode, &definition_name_token.contents);
        let Some(address) = tools.loader.lookup(library, &symbol_name) else {
            report_error_at_token(
                &environment.sources,
                ErrorKind::Toolchain,
                &definition_name_token,
                "failed to find symbol in loaded library",
            );
            continue;
        };

        let function = match definition_kind {
            crate::eval::ObjectKind::CompileTimeMacro => {
                CompileTimeFunction::Macro(unsafe { std::mem::transmute::<*const (), MacroFn>(address) })
            }
            _ => CompileTimeFunction::Generator(unsafe {
                std::mem::transmute::<*const (), GeneratorFn>(address)
            }),
        };
        environment.install_compile_time_function(&definition_name, function);

        build_objects[index].stage = BuildStage::ResolvingReferences;

        if !environment.reference_pools.contains_key(&definition_name) {
            error!(
                target: "scone::build",
                "built an object which had no references; it should not have been required"
            );
            continue;
        }

        // Walk the pool by live index: re-evaluation can append sites for
        // other names, and appending never moves earlier entries.
        let mut site_index = 0;
        loop {
            let site = match environment
                .reference_pools
                .get(&definition_name)
                .and_then(|pool| pool.get(site_index))
            {
                Some(site) => site.clone(),
                None => break,
            };
            if site.is_resolved {
                site_index += 1;
                continue;
            }

            // A compile-time function may have already guessed this site
            // was a runtime call; clear that output before re-evaluating.
            let num_errors = {
                let mut splice = site.splice_output.borrow_mut();
                splice.reset();
                evaluate_form(
                    environment,
                    &site.context,
                    &site.tokens,
                    site.start_index,
                    &mut splice,
                )
            };
            // Whatever evaluation turned up, this site is settled; running
            // it again would only repeat the same errors.
            *num_errors_out += num_errors;
            if let Some(pool) = environment.reference_pools.get_mut(&definition_name) {
                pool[site_index].is_resolved = true;
            }
            num_references_resolved += 1;
            site_index += 1;
        }

        if let Some(definition) = environment.definitions.get_mut(&definition_name) {
            definition.is_loaded = true;
        }
        build_objects[index].stage = BuildStage::Finished;
        debug!(
            target: "scone::build",
            "successfully built, loaded, and executed {}", definition_name
        );
    }

    num_references_resolved
}
