// crates/suite-relay-agent/src/engine.rs
// ============================================================================
// Module: Execution Engine
// Description: Async engine interface and the process-backed implementation.
// Purpose: Isolate the external test runner behind a narrow seam.
// Dependencies: async-trait, command-group, tokio::process, suite-relay-core
// ============================================================================

//! ## Overview
//! An [`ExecutionEngine`] runs one suite inside a working directory and
//! reports its exit code and captured output. Artifacts are whatever the
//! engine leaves in the directory; the orchestrator collects them.
//!
//! [`ProcessEngine`] spawns the configured program with the working directory
//! as cwd. Options become command-line flags: `String` as `--name value`,
//! `Bool(true)` as `--name`, and `StringList` as one `--name value` pair per
//! element. The entry point is the final argument.
//!
//! Engines receive the run deadline. The process engine spawns the runner as
//! the leader of its own process group; at the deadline the whole group is
//! killed and the leader reaped before the call returns, so nothing the
//! runner started is still writing into the working directory at cleanup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use command_group::AsyncCommandGroup;
use command_group::AsyncGroupChild;
use suite_relay_config::EngineConfig;
use suite_relay_core::ExecutionOptions;
use suite_relay_core::OptionValue;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::Instant;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Exit code reported when the engine terminated without one (for example by
/// a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// Output captured from one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Engine failures that prevented a run from producing an exit code.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine could not be started.
    #[error("failed to start engine: {0}")]
    Spawn(String),
    /// Engine I/O failed while running.
    #[error("engine io error: {0}")]
    Io(String),
    /// Run passed its deadline and was stopped.
    #[error("engine stopped at the deadline")]
    DeadlineExceeded,
}

/// External test runner.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Runs `entry_point` inside `work_dir` with the given options.
    ///
    /// Engines should stop all work they started and return
    /// [`EngineError::DeadlineExceeded`] once `deadline` passes. The
    /// orchestrator abandons engines that overrun it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the engine cannot run at all or was
    /// stopped at the deadline.
    async fn execute(
        &self,
        work_dir: &Path,
        entry_point: &str,
        options: &ExecutionOptions,
        deadline: Instant,
    ) -> Result<EngineOutput, EngineError>;
}

// ============================================================================
// SECTION: Process Engine
// ============================================================================

/// Engine backed by a child process.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    /// Program to spawn.
    program: String,
    /// Leading arguments.
    args: Vec<String>,
    /// Extra environment variables.
    env: BTreeMap<String, String>,
}

impl ProcessEngine {
    /// Creates an engine for `program` with no extra arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Creates an engine from agent configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }

    /// Appends leading arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builds the argument vector for one run.
    #[must_use]
    pub fn arguments(&self, entry_point: &str, options: &ExecutionOptions) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.extend(option_arguments(options));
        argv.push(entry_point.to_string());
        argv
    }
}

#[async_trait]
impl ExecutionEngine for ProcessEngine {
    async fn execute(
        &self,
        work_dir: &Path,
        entry_point: &str,
        options: &ExecutionOptions,
        deadline: Instant,
    ) -> Result<EngineOutput, EngineError> {
        let mut command = Command::new(&self.program);
        command
            .args(self.arguments(entry_point, options))
            .envs(&self.env)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child: AsyncGroupChild = command
            .group_spawn()
            .map_err(|err| EngineError::Spawn(format!("{}: {err}", self.program)))?;
        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();

        let running = &mut child;
        let finished = tokio::time::timeout_at(deadline, async move {
            tokio::join!(running.wait(), read_pipe(stdout), read_pipe(stderr))
        })
        .await;
        let Ok((status, stdout, stderr)) = finished else {
            stop_group(&mut child).await;
            return Err(EngineError::DeadlineExceeded);
        };
        let status = status.map_err(|err| EngineError::Io(err.to_string()))?;
        let stdout = stdout.map_err(|err| EngineError::Io(err.to_string()))?;
        let stderr = stderr.map_err(|err| EngineError::Io(err.to_string()))?;
        Ok(EngineOutput {
            exit_code: status.code().unwrap_or(NO_EXIT_CODE),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a child pipe to the end.
async fn read_pipe<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

/// Kills every process in the child's group and reaps the leader.
async fn stop_group(child: &mut AsyncGroupChild) {
    // Fails only when the group already exited.
    let _ = child.kill().await;
}

/// Maps typed options to command-line flags in key order.
fn option_arguments(options: &ExecutionOptions) -> Vec<String> {
    let mut argv = Vec::new();
    for (name, value) in options {
        let flag = format!("--{name}");
        match value {
            OptionValue::String(text) => {
                argv.push(flag);
                argv.push(text.clone());
            }
            OptionValue::Bool(true) => argv.push(flag),
            OptionValue::Bool(false) => {}
            OptionValue::StringList(items) => {
                for item in items {
                    argv.push(flag.clone());
                    argv.push(item.clone());
                }
            }
        }
    }
    argv
}

// ============================================================================
// SECTION: Tests
// ============================================================================
