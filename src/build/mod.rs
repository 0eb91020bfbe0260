//! Building and loading compile-time objects: dependency propagation, the
//! transpile/compile/link/load pipeline, and the fixed-point resolver.

pub mod loader;
pub mod pipeline;
pub mod process;
pub mod propagate;
pub mod resolver;

pub use loader::{DynamicLoader, LibraryHandle};
#[cfg(unix)]
pub use loader::SystemDynamicLoader;
pub use pipeline::{build_evaluate_references, BuildOptions, BuildTools};
pub use process::{ProcessRunner, RunRequest, SystemProcessRunner};
pub use propagate::propagate_required_to_references;
pub use resolver::resolve_all;
