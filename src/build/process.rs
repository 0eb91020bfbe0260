//! Child process management for the toolchain.
//!
//! The pipeline owns the concurrency policy (spawn until the cap, then
//! drain); the runner just spawns and joins. It is a trait so tests can
//! observe spawn patterns and fabricate results without a real compiler.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use crate::diagnostics::{ErrorKind, SconeError};

/// One process to spawn. `key` is the caller's correlation id, echoed back
/// with the exit status from `wait_all`.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub key: usize,
    pub executable: PathBuf,
    pub arguments: Vec<String>,
}

pub trait ProcessRunner {
    /// Spawns the process and returns immediately.
    fn run(&mut self, request: RunRequest) -> Result<(), SconeError>;

    /// Blocks until every spawned child has exited, streaming output lines
    /// to `on_output`. Returns `(key, exit_status)` pairs for the children
    /// drained by this call.
    fn wait_all(&mut self, on_output: &mut dyn FnMut(&str)) -> Vec<(usize, i32)>;
}

/// Real runner over `std::process::Command` with piped output.
#[derive(Default)]
pub struct SystemProcessRunner {
    children: Vec<(usize, Child)>,
}

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessRunner for SystemProcessRunner {
    fn run(&mut self, request: RunRequest) -> Result<(), SconeError> {
        debug!(
            target: "scone::build",
            "running {} {}", request.executable.display(), request.arguments.join(" ")
        );
        let child = Command::new(&request.executable)
            .args(&request.arguments)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                SconeError::new(
                    ErrorKind::Toolchain,
                    format!("failed to spawn {}: {}", request.executable.display(), error),
                )
            })?;
        self.children.push((request.key, child));
        Ok(())
    }

    fn wait_all(&mut self, on_output: &mut dyn FnMut(&str)) -> Vec<(usize, i32)> {
        let mut statuses = Vec::new();
        for (key, child) in self.children.drain(..) {
            match child.wait_with_output() {
                Ok(output) => {
                    for line in String::from_utf8_lossy(&output.stdout).lines() {
                        on_output(line);
                    }
                    for line in String::from_utf8_lossy(&output.stderr).lines() {
                        on_output(line);
                    }
                    statuses.push((key, output.status.code().unwrap_or(-1)));
                }
                Err(_) => statuses.push((key, -1)),
            }
        }
        statuses
    }
}
