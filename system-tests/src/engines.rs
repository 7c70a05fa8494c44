// system-tests/src/engines.rs
// ============================================================================
// Module: Scripted Engines
// Description: In-process stand-ins for the test runner.
// Purpose: Produce known reports and let scenarios hold a run open.
// Dependencies: async-trait, suite-relay-agent, tokio
// ============================================================================

//! ## Overview
//! [`ReportEngine`] writes a fixed report set into the working directory and
//! counts its runs. When built with [`ReportEngine::gated`] each run waits for
//! [`ReportEngine::release`] before finishing, which lets a scenario observe
//! the agent while the slot is held.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use suite_relay_agent::EngineError;
use suite_relay_agent::EngineOutput;
use suite_relay_agent::ExecutionEngine;
use suite_relay_core::ExecutionOptions;
use suite_relay_core::OptionValue;
use tokio::sync::Notify;
use tokio::sync::Semaphore;
use tokio::time::Instant;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Report body written by every run.
pub const LOG_HTML: &[u8] = b"<html><body>1 test, 1 passed</body></html>\n";
/// Option name whose value becomes the exit code.
pub const EXIT_CODE_OPTION: &str = "exitcode";

// ============================================================================
// SECTION: Report Engine
// ============================================================================

/// Engine writing `log.html`, `output.xml`, and `report/summary.txt`.
#[derive(Default)]
pub struct ReportEngine {
    /// Completed or started runs.
    runs: AtomicUsize,
    /// Signalled when a run starts.
    started: Notify,
    /// Permits gating run completion, when gated.
    gate: Option<Semaphore>,
}

impl ReportEngine {
    /// Creates an engine whose runs finish immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine whose runs wait for [`Self::release`].
    #[must_use]
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Returns how many runs have started.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Waits until a run has started.
    pub async fn wait_started(&self) {
        let notified = self.started.notified();
        if self.runs() > 0 {
            return;
        }
        notified.await;
    }

    /// Lets one gated run finish.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl ExecutionEngine for ReportEngine {
    async fn execute(
        &self,
        work_dir: &Path,
        entry_point: &str,
        options: &ExecutionOptions,
        _deadline: Instant,
    ) -> Result<EngineOutput, EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.started.notify_waiters();
        if let Some(gate) = &self.gate {
            let permit =
                gate.acquire().await.map_err(|err| EngineError::Io(err.to_string()))?;
            permit.forget();
        }

        let suite = fs::read_to_string(work_dir.join(entry_point))
            .map_err(|err| EngineError::Io(err.to_string()))?;
        let mut files = Vec::new();
        for entry in fs::read_dir(work_dir).map_err(|err| EngineError::Io(err.to_string()))? {
            let entry = entry.map_err(|err| EngineError::Io(err.to_string()))?;
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
        files.sort();

        let write = |relative: &str, bytes: &[u8]| -> Result<(), EngineError> {
            let path = work_dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| EngineError::Io(err.to_string()))?;
            }
            fs::write(path, bytes).map_err(|err| EngineError::Io(err.to_string()))
        };
        write("log.html", LOG_HTML)?;
        write("output.xml", format!("<robot lines=\"{}\"/>", suite.lines().count()).as_bytes())?;
        write("report/summary.txt", files.join("\n").as_bytes())?;

        let exit_code = match options.get(EXIT_CODE_OPTION) {
            Some(OptionValue::String(value)) => value.parse().unwrap_or(0),
            _ => 0,
        };
        Ok(EngineOutput {
            exit_code,
            stdout: format!("Executed {entry_point} with {} file(s)", files.len()),
            stderr: String::new(),
        })
    }
}
