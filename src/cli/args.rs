//! Command-line arguments, declared with clap's derive API.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "scone",
    version,
    about = "Transpile s-expression source to C/C++, with compile-time code generation"
)]
pub struct SconeArgs {
    /// The source file to transpile.
    pub file: PathBuf,

    /// Directory for compile-time build artifacts.
    #[arg(long, default_value = "scone_cache")]
    pub cache_dir: PathBuf,

    /// Compiler used for compile-time objects.
    #[arg(long, default_value = "/usr/bin/clang++")]
    pub compiler: PathBuf,

    /// Maximum concurrent compiler processes.
    #[arg(long, default_value_t = 8)]
    pub max_processes: usize,

    /// Reify module variables as pointers for hot reloading.
    #[arg(long)]
    pub hot_reload: bool,

    /// Enable debug logging (RUST_LOG overrides).
    #[arg(short, long)]
    pub verbose: bool,
}
