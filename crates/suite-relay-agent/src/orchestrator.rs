// crates/suite-relay-agent/src/orchestrator.rs
// ============================================================================
// Module: Execution Orchestrator
// Description: Per-request state machine from validation to cleanup.
// Purpose: Run one suite in an isolated directory under a deadline.
// Dependencies: tempfile, tokio, suite-relay-core
// ============================================================================

//! ## Overview
//! Each request moves through `received -> unpacking -> running -> collecting
//! -> done`, with an error edge to `failed` and a forced edge from `running`
//! to `timed_out`. Validation happens before any side effect. The working
//! directory is created fresh per request and removed whatever the outcome;
//! cleanup errors are audited and never change the reported status.
//!
//! The orchestrator assumes its caller holds the execution slot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use suite_relay_config::AgentConfig;
use suite_relay_core::DEFAULT_HASH_ALGORITHM;
use suite_relay_core::ExecutionRequest;
use suite_relay_core::ExecutionResult;
use suite_relay_core::ExecutionStatus;
use suite_relay_core::FileEntry;
use suite_relay_core::PackError;
use suite_relay_core::Packager;
use suite_relay_core::RequestId;
use suite_relay_core::SuiteBundle;
use suite_relay_core::hash_canonical_json;
use suite_relay_core::unpack;
use tempfile::TempDir;
use thiserror::Error;
use tokio::time::Instant;

use crate::audit::AuditEvent;
use crate::audit::AuditSink;
use crate::engine::EngineError;
use crate::engine::ExecutionEngine;
use crate::engine::NO_EXIT_CODE;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix for per-request working directories.
pub const WORK_DIR_PREFIX: &str = "suite-relay-";
/// Maximum length of an option name.
const MAX_OPTION_NAME_LENGTH: usize = 64;
/// Time an engine gets past its deadline to stop before it is abandoned.
const ENGINE_STOP_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// SECTION: Phases
// ============================================================================

/// Execution state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPhase {
    /// Request decoded; validation pending.
    Received,
    /// Working directory being populated.
    Unpacking,
    /// Engine running.
    Running,
    /// Artifacts being gathered.
    Collecting,
    /// Result ready.
    Done,
    /// Pipeline error before a result could be produced normally.
    Failed,
    /// Engine cut off at the deadline.
    TimedOut,
}

impl ExecutionPhase {
    /// Returns the stable audit label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Unpacking => "unpacking",
            Self::Running => "running",
            Self::Collecting => "collecting",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Orchestrator errors raised before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// Request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Runs validated requests through the execution state machine.
pub struct Orchestrator {
    /// External test engine.
    engine: Arc<dyn ExecutionEngine>,
    /// Parent directory for working directories.
    work_root: PathBuf,
    /// Agent-side execution bound.
    max_timeout: Duration,
    /// Artifact names returned even when they were in the bundle.
    well_known: BTreeSet<String>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

impl Orchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        work_root: PathBuf,
        max_timeout: Duration,
        well_known: impl IntoIterator<Item = String>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            engine,
            work_root,
            max_timeout,
            well_known: well_known.into_iter().collect(),
            audit,
        }
    }

    /// Creates an orchestrator from agent configuration.
    #[must_use]
    pub fn from_config(
        config: &AgentConfig,
        engine: Arc<dyn ExecutionEngine>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let work_root = config.work_root.as_ref().map_or_else(std::env::temp_dir, PathBuf::from);
        Self::new(
            engine,
            work_root,
            config.execution_timeout(),
            config.artifacts.well_known.clone(),
            audit,
        )
    }

    /// Returns the working directory parent.
    #[must_use]
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Returns the deadline applied to a declared timeout.
    ///
    /// The effective bound is the smaller of the declared and configured
    /// values; a declared `0` means "use the configured bound".
    #[must_use]
    pub fn effective_timeout(&self, declared_seconds: u64) -> Duration {
        if declared_seconds == 0 {
            return self.max_timeout;
        }
        Duration::from_secs(declared_seconds).min(self.max_timeout)
    }

    /// Validates a request in the `received` phase.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidRequest`] when the identifier is
    /// blank, the bundle is invalid, or an option name is unsafe.
    pub fn validate(&self, request: &ExecutionRequest) -> Result<(), OrchestratorError> {
        self.phase(&request.request_id, ExecutionPhase::Received, None);
        if request.request_id.is_blank() {
            return Err(OrchestratorError::InvalidRequest("request id is empty".to_string()));
        }
        request
            .bundle
            .validate()
            .map_err(|err| OrchestratorError::InvalidRequest(err.to_string()))?;
        for name in request.bundle.options.keys() {
            validate_option_name(name)?;
        }
        Ok(())
    }

    /// Executes a validated request and always returns a result.
    pub async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        let request_id = &request.request_id;
        let digest = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &request.bundle)
            .map(|digest| format!("bundle sha256:{}", digest.value))
            .ok();
        self.phase(request_id, ExecutionPhase::Unpacking, digest);
        let work_dir = match tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(&self.work_root)
        {
            Ok(dir) => dir,
            Err(err) => {
                let message = format!("failed to create working directory: {err}");
                self.phase(request_id, ExecutionPhase::Failed, Some(message.clone()));
                return failure(request_id, message);
            }
        };
        let result = self.run_in(&work_dir, request).await;
        self.cleanup(request_id, work_dir);
        result
    }

    /// Runs the unpack, engine, and collection phases in `work_dir`.
    async fn run_in(&self, work_dir: &TempDir, request: &ExecutionRequest) -> ExecutionResult {
        let request_id = &request.request_id;
        let bundle = &request.bundle;
        if let Err(err) = unpack(bundle, work_dir.path()) {
            let message = format!("failed to unpack bundle: {err}");
            self.phase(request_id, ExecutionPhase::Failed, Some(message.clone()));
            return failure(request_id, message);
        }

        let limit = self.effective_timeout(request.timeout_seconds);
        self.phase(
            request_id,
            ExecutionPhase::Running,
            Some(format!("timeout {}s", limit.as_secs())),
        );
        let deadline = Instant::now() + limit;
        let outcome = tokio::time::timeout_at(
            deadline + ENGINE_STOP_GRACE,
            self.engine.execute(work_dir.path(), &bundle.entry_point, &bundle.options, deadline),
        )
        .await;
        let (status, exit_code, stdout, stderr, mut message, final_phase) = match outcome {
            Err(_) | Ok(Err(EngineError::DeadlineExceeded)) => (
                ExecutionStatus::Timeout,
                NO_EXIT_CODE,
                String::new(),
                String::new(),
                Some(format!("execution exceeded {}s and was terminated", limit.as_secs())),
                ExecutionPhase::TimedOut,
            ),
            Ok(Err(err)) => (
                ExecutionStatus::ExecutionError,
                NO_EXIT_CODE,
                String::new(),
                String::new(),
                Some(err.to_string()),
                ExecutionPhase::Failed,
            ),
            Ok(Ok(output)) => (
                ExecutionStatus::from_exit_code(output.exit_code),
                output.exit_code,
                output.stdout,
                output.stderr,
                None,
                ExecutionPhase::Done,
            ),
        };

        self.phase(request_id, ExecutionPhase::Collecting, None);
        let artifacts = match self.collect(work_dir.path(), bundle) {
            Ok(artifacts) => artifacts,
            Err(err) => {
                let note = format!("artifact collection failed: {err}");
                message = Some(message.map_or_else(|| note.clone(), |text| format!("{text}; {note}")));
                Vec::new()
            }
        };
        self.phase(request_id, final_phase, Some(status.as_str().to_string()));
        ExecutionResult {
            request_id: request_id.clone(),
            status,
            exit_code,
            artifacts,
            stdout,
            stderr,
            message,
        }
    }

    /// Gathers new files and well-known artifacts from `work_dir`.
    fn collect(&self, work_dir: &Path, bundle: &SuiteBundle) -> Result<Vec<FileEntry>, PackError> {
        let original = bundle.paths();
        let files = Packager::new().snapshot(work_dir)?;
        Ok(files
            .into_iter()
            .filter(|entry| !original.contains(&entry.path) || self.well_known.contains(&entry.path))
            .collect())
    }

    /// Removes the working directory, auditing failures.
    fn cleanup(&self, request_id: &RequestId, work_dir: TempDir) {
        let path = work_dir.path().display().to_string();
        if let Err(err) = work_dir.close() {
            self.audit.record(&AuditEvent::cleanup_failed(
                request_id.to_string(),
                path,
                err.to_string(),
            ));
        }
    }

    /// Records a phase transition.
    fn phase(&self, request_id: &RequestId, phase: ExecutionPhase, detail: Option<String>) {
        self.audit.record(&AuditEvent::execution_phase(request_id.to_string(), phase.as_str(), detail));
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an `EXECUTION_ERROR` result with no artifacts.
fn failure(request_id: &RequestId, message: String) -> ExecutionResult {
    ExecutionResult {
        request_id: request_id.clone(),
        status: ExecutionStatus::ExecutionError,
        exit_code: NO_EXIT_CODE,
        artifacts: Vec::new(),
        stdout: String::new(),
        stderr: String::new(),
        message: Some(message),
    }
}

/// Requires option names to be plain flag identifiers.
fn validate_option_name(name: &str) -> Result<(), OrchestratorError> {
    let mut chars = name.chars();
    let valid = name.len() <= MAX_OPTION_NAME_LENGTH
        && chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidRequest(format!("invalid option name {name:?}")))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::validate_option_name;

    #[test]
    fn option_names_must_be_plain_identifiers() {
        assert!(validate_option_name("include").is_ok());
        assert!(validate_option_name("log-level_2").is_ok());
        assert!(validate_option_name("").is_err());
        assert!(validate_option_name("-x").is_err());
        assert!(validate_option_name("a b").is_err());
        assert!(validate_option_name("a=b").is_err());
    }
}
