//! Build pipeline properties: the parallelism cap and the cached-artifact
//! rule, observed through the stub toolchain against a real cache
//! directory.

mod common;

use common::{evaluate_module, test_environment, StubDynamicLoader, StubProcessRunner};
use scone::build::{resolve_all, BuildOptions, BuildTools};
use scone::eval::{Context, Environment};
use scone::syntax::{Token, TokenList};

fn macro_expand_empty(
    _environment: &mut Environment,
    _context: &Context,
    _tokens: &TokenList,
    _invocation_index: usize,
    _output: &mut Vec<Token>,
) -> bool {
    true
}

fn loader_for(names: &[&str]) -> StubDynamicLoader {
    let mut loader = StubDynamicLoader::default();
    for name in names {
        loader = loader.with_macro(name, macro_expand_empty);
    }
    loader
}

#[test]
fn compile_processes_never_exceed_the_cap() {
    let work_dir = tempfile::tempdir().unwrap();
    let source = "(defmacro a ())\n(defmacro b ())\n(defmacro c ())\n\
                  (defmacro d ())\n(defmacro e ())\n(a)\n(b)\n(c)\n(d)\n(e)";
    let (mut environment, tokens, context) = test_environment("many.scn", source);
    environment.working_dir = work_dir.path().to_path_buf();

    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    let mut runner = StubProcessRunner::default();
    let mut loader = loader_for(&["a", "b", "c", "d", "e"]);
    let mut tools = BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: BuildOptions {
            max_processes: 2,
            ..BuildOptions::default()
        },
    };
    assert!(resolve_all(&mut environment, &mut tools));

    // Five compiles and five links, never more than two in flight.
    assert_eq!(runner.spawned.len(), 10);
    assert!(
        runner.max_concurrent <= 2,
        "cap exceeded: {} concurrent",
        runner.max_concurrent
    );
    for name in ["a", "b", "c", "d", "e"] {
        assert!(environment.definitions[name].is_loaded);
    }
}

#[test]
fn colliding_converted_names_get_distinct_artifacts() {
    let work_dir = tempfile::tempdir().unwrap();
    // Both names convert to the c identifier my_macro; the build id keeps
    // their artifacts from clobbering each other.
    let source = "(defmacro my-macro ())\n(defmacro my_macro ())\n(my-macro)\n(my_macro)";
    let (mut environment, tokens, context) = test_environment("collide.scn", source);
    environment.working_dir = work_dir.path().to_path_buf();

    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);

    let mut runner = StubProcessRunner::default();
    let mut loader = loader_for(&["my_macro"]);
    let mut tools = BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: BuildOptions::default(),
    };
    assert!(resolve_all(&mut environment, &mut tools));

    assert!(environment.definitions["my-macro"].is_loaded);
    assert!(environment.definitions["my_macro"].is_loaded);
    assert_eq!(runner.spawned.len(), 4);

    // Candidates are sorted, so the ids (and names) are stable: my-macro
    // sorts before my_macro.
    assert!(work_dir.path().join("comptime_my_macro_1.cpp").exists());
    assert!(work_dir.path().join("comptime_my_macro_2.cpp").exists());
    assert!(work_dir.path().join("libcomptime_my_macro_1.so").exists());
    assert!(work_dir.path().join("libcomptime_my_macro_2.so").exists());
}

#[test]
fn unchanged_artifacts_are_not_rebuilt() {
    let work_dir = tempfile::tempdir().unwrap();
    let source = "(defmacro m ())\n(m)";

    // First run: compile and link.
    let (mut environment, tokens, context) = test_environment("cached.scn", source);
    environment.working_dir = work_dir.path().to_path_buf();
    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);
    let mut runner = StubProcessRunner::default();
    let mut loader = loader_for(&["m"]);
    let mut tools = BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: BuildOptions::default(),
    };
    assert!(resolve_all(&mut environment, &mut tools));
    assert_eq!(runner.spawned.len(), 2);

    let source_path = work_dir.path().join("comptime_m.cpp");
    let library_path = work_dir.path().join("libcomptime_m.so");
    assert!(source_path.exists());
    assert!(library_path.exists());

    // Second run over the same cache: the transpiled source is unchanged,
    // so the library is current and the toolchain stays idle.
    let (mut environment, tokens, context) = test_environment("cached.scn", source);
    environment.working_dir = work_dir.path().to_path_buf();
    let (_output, num_errors) = evaluate_module(&mut environment, &context, &tokens);
    assert_eq!(num_errors, 0);
    let mut runner = StubProcessRunner::default();
    let mut loader = loader_for(&["m"]);
    let mut tools = BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: BuildOptions::default(),
    };
    assert!(resolve_all(&mut environment, &mut tools));
    assert!(runner.spawned.is_empty(), "cached build must not invoke the toolchain");
    assert_eq!(loader.loads.len(), 1);

    // Removing the library forces a rebuild even though the source is
    // untouched.
    std::fs::remove_file(&library_path).unwrap();
    let (mut environment, tokens, context) = test_environment("cached.scn", source);
    environment.working_dir = work_dir.path().to_path_buf();
    let (_output, _) = evaluate_module(&mut environment, &context, &tokens);
    let mut runner = StubProcessRunner::default();
    let mut loader = loader_for(&["m"]);
    let mut tools = BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: BuildOptions::default(),
    };
    assert!(resolve_all(&mut environment, &mut tools));
    assert_eq!(runner.spawned.len(), 2);

    // A stale on-disk source is rewritten (it differs from the transpiled
    // form), which makes it newer than the library: rebuild.
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(&source_path, "// stale").unwrap();
    let (mut environment, tokens, context) = test_environment("cached.scn", source);
    environment.working_dir = work_dir.path().to_path_buf();
    let (_output, _) = evaluate_module(&mut environment, &context, &tokens);
    let mut runner = StubProcessRunner::default();
    let mut loader = loader_for(&["m"]);
    let mut tools = BuildTools {
        runner: &mut runner,
        loader: &mut loader,
        options: BuildOptions::default(),
    };
    assert!(resolve_all(&mut environment, &mut tools));
    assert_eq!(runner.spawned.len(), 2);
}
