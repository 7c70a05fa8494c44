// crates/suite-relay-agent/src/ledger.rs
// ============================================================================
// Module: Idempotency Ledger
// Description: Bounded record of recent request identifiers and outcomes.
// Purpose: Ensure a retried identifier never executes a suite twice.
// Dependencies: suite-relay-core
// ============================================================================

//! ## Overview
//! The ledger remembers the most recent request identifiers. A new identifier
//! is admitted and marked in flight; a duplicate of an in-flight run is
//! refused; a duplicate of a completed run receives the cached result.
//! Identifiers that never reached execution are forgotten so the client can
//! retry them. Only completed entries are evicted when the ledger is full.
//!
//! Completed results are also held to a byte budget. Once the artifacts and
//! captured output of completed entries exceed it, the oldest are reduced to
//! their status, exit code, and message. A replay of a reduced entry still
//! never runs the suite again; it reports that the artifacts are gone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use suite_relay_core::ExecutionResult;
use suite_relay_core::RequestId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of remembered identifiers.
pub const DEFAULT_LEDGER_CAPACITY: usize = 256;
/// Default bytes of artifacts and output retained for replay.
pub const DEFAULT_LEDGER_BYTE_BUDGET: usize = 64 * 1024 * 1024;
/// Message attached to replays of reduced entries.
const RESULT_REDUCED_NOTE: &str = "artifacts and output of the original run are no longer retained";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Admission decision for an incoming identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Identifier is new and now marked in flight.
    Admitted,
    /// A run with this identifier is still in flight.
    InFlight,
    /// A run with this identifier completed; replay its result.
    Completed(Box<ExecutionResult>),
}

/// State of a remembered identifier.
#[derive(Debug, Clone)]
enum Entry {
    /// Run admitted but not finished.
    InFlight,
    /// Run finished with this result.
    Completed {
        /// Result replayed to duplicates.
        result: Box<ExecutionResult>,
        /// Artifact and output bytes held by `result`.
        retained: usize,
    },
}

/// Mutable ledger contents.
#[derive(Debug, Default)]
struct LedgerState {
    /// Entries keyed by identifier.
    entries: HashMap<RequestId, Entry>,
    /// Identifiers in admission order.
    order: VecDeque<RequestId>,
    /// Artifact and output bytes held across completed entries.
    retained: usize,
}

/// Bounded idempotency ledger.
#[derive(Debug)]
pub struct IdempotencyLedger {
    /// Guarded ledger contents.
    state: Mutex<LedgerState>,
    /// Maximum remembered identifiers.
    capacity: usize,
    /// Maximum artifact and output bytes kept for replay.
    byte_budget: usize,
}

impl Default for IdempotencyLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

impl IdempotencyLedger {
    /// Creates an empty ledger with the default byte budget.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_byte_budget(capacity, DEFAULT_LEDGER_BYTE_BUDGET)
    }

    /// Creates an empty ledger holding at most `byte_budget` bytes of
    /// artifacts and output.
    #[must_use]
    pub fn with_byte_budget(capacity: usize, byte_budget: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            capacity: capacity.max(1),
            byte_budget,
        }
    }

    /// Admits an identifier or reports the existing run.
    pub fn admit(&self, request_id: &RequestId) -> Admission {
        let mut state = self.lock();
        match state.entries.get(request_id) {
            Some(Entry::InFlight) => return Admission::InFlight,
            Some(Entry::Completed {
                result,
                ..
            }) => return Admission::Completed(result.clone()),
            None => {}
        }
        state.entries.insert(request_id.clone(), Entry::InFlight);
        state.order.push_back(request_id.clone());
        self.evict(&mut state);
        Admission::Admitted
    }

    /// Records the result of an admitted run.
    pub fn complete(&self, request_id: &RequestId, result: &ExecutionResult) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(request_id) else {
            return;
        };
        let retained = retained_bytes(result);
        let previous = match entry {
            Entry::Completed {
                retained,
                ..
            } => *retained,
            Entry::InFlight => 0,
        };
        *entry = Entry::Completed {
            result: Box::new(result.clone()),
            retained,
        };
        state.retained = state.retained.saturating_sub(previous) + retained;
        self.reduce(&mut state);
    }

    /// Forgets an admitted identifier whose run never started.
    pub fn abandon(&self, request_id: &RequestId) {
        let mut state = self.lock();
        if matches!(state.entries.get(request_id), Some(Entry::InFlight)) {
            state.entries.remove(request_id);
            state.order.retain(|id| id != request_id);
        }
    }

    /// Returns the number of remembered identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true when no identifiers are remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the artifact and output bytes currently kept for replay.
    #[must_use]
    pub fn retained_bytes(&self) -> usize {
        self.lock().retained
    }

    /// Locks the state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the oldest completed entries while over capacity.
    fn evict(&self, state: &mut LedgerState) {
        while state.entries.len() > self.capacity {
            let Some(position) = state.order.iter().position(|id| {
                matches!(
                    state.entries.get(id),
                    Some(Entry::Completed {
                        ..
                    })
                )
            }) else {
                break;
            };
            if let Some(id) = state.order.remove(position)
                && let Some(Entry::Completed {
                    retained,
                    ..
                }) = state.entries.remove(&id)
            {
                state.retained = state.retained.saturating_sub(retained);
            }
        }
    }

    /// Reduces the oldest completed results while over the byte budget.
    fn reduce(&self, state: &mut LedgerState) {
        let LedgerState {
            entries,
            order,
            retained: total,
        } = state;
        for id in order.iter() {
            if *total <= self.byte_budget {
                break;
            }
            if let Some(Entry::Completed {
                result,
                retained,
            }) = entries.get_mut(id)
                && *retained > 0
            {
                *total = total.saturating_sub(*retained);
                *retained = 0;
                reduce_result(result);
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Counts the artifact and output bytes a result holds.
fn retained_bytes(result: &ExecutionResult) -> usize {
    result.artifacts.iter().map(|entry| entry.path.len() + entry.content.len()).sum::<usize>()
        + result.stdout.len()
        + result.stderr.len()
}

/// Drops artifacts and output, keeping status, exit code, and message.
fn reduce_result(result: &mut ExecutionResult) {
    result.artifacts = Vec::new();
    result.stdout = String::new();
    result.stderr = String::new();
    result.message = Some(match result.message.take() {
        Some(message) => format!("{message}; {RESULT_REDUCED_NOTE}"),
        None => RESULT_REDUCED_NOTE.to_string(),
    });
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only ledger assertions."
    )]

    use suite_relay_core::ExecutionStatus;
    use suite_relay_core::FileEntry;

    use super::*;

    fn result(id: &str) -> ExecutionResult {
        ExecutionResult {
            request_id: RequestId::new(id),
            status: ExecutionStatus::Success,
            exit_code: 0,
            artifacts: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            message: None,
        }
    }

    #[test]
    fn duplicate_in_flight_is_refused_and_completed_is_replayed() {
        let ledger = IdempotencyLedger::default();
        let id = RequestId::new("a");
        assert_eq!(ledger.admit(&id), Admission::Admitted);
        assert_eq!(ledger.admit(&id), Admission::InFlight);
        ledger.complete(&id, &result("a"));
        assert_eq!(ledger.admit(&id), Admission::Completed(Box::new(result("a"))));
    }

    #[test]
    fn abandoned_identifier_can_be_admitted_again() {
        let ledger = IdempotencyLedger::default();
        let id = RequestId::new("a");
        assert_eq!(ledger.admit(&id), Admission::Admitted);
        ledger.abandon(&id);
        assert!(ledger.is_empty());
        assert_eq!(ledger.admit(&id), Admission::Admitted);
    }

    #[test]
    fn eviction_drops_oldest_completed_but_keeps_in_flight() {
        let ledger = IdempotencyLedger::new(2);
        let first = RequestId::new("first");
        let second = RequestId::new("second");
        let third = RequestId::new("third");
        ledger.admit(&first);
        ledger.admit(&second);
        ledger.complete(&second, &result("second"));
        ledger.admit(&third);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.admit(&first), Admission::InFlight);
        assert_eq!(ledger.admit(&second), Admission::Admitted);
    }

    fn result_with_log(id: &str, bytes: usize) -> ExecutionResult {
        ExecutionResult {
            artifacts: vec![FileEntry::new("log.html", vec![b'x'; bytes])],
            stdout: "1 test, 1 passed".to_string(),
            ..result(id)
        }
    }

    #[test]
    fn completed_results_are_reduced_oldest_first_over_byte_budget() {
        let ledger = IdempotencyLedger::with_byte_budget(16, 1_000);
        let old = RequestId::new("old");
        let new = RequestId::new("new");
        ledger.admit(&old);
        ledger.complete(&old, &result_with_log("old", 600));
        ledger.admit(&new);
        ledger.complete(&new, &result_with_log("new", 600));

        let Admission::Completed(replayed) = ledger.admit(&old) else {
            panic!("old result should replay");
        };
        assert_eq!(replayed.status, ExecutionStatus::Success);
        assert_eq!(replayed.exit_code, 0);
        assert!(replayed.artifacts.is_empty());
        assert!(replayed.stdout.is_empty());
        assert_eq!(replayed.message.as_deref(), Some(RESULT_REDUCED_NOTE));

        assert_eq!(ledger.admit(&new), Admission::Completed(Box::new(result_with_log("new", 600))));
        assert_eq!(ledger.retained_bytes(), retained_bytes(&result_with_log("new", 600)));
    }

    #[test]
    fn result_larger_than_budget_is_kept_only_as_summary() {
        let ledger = IdempotencyLedger::with_byte_budget(16, 100);
        let id = RequestId::new("huge");
        ledger.admit(&id);
        let mut huge = result_with_log("huge", 4_096);
        huge.message = Some("artifact collection failed: denied".to_string());
        ledger.complete(&id, &huge);

        assert_eq!(ledger.retained_bytes(), 0);
        let Admission::Completed(replayed) = ledger.admit(&id) else {
            panic!("summary should replay");
        };
        assert!(replayed.artifacts.is_empty());
        let expected = format!("artifact collection failed: denied; {RESULT_REDUCED_NOTE}");
        assert_eq!(replayed.message.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn evicted_entries_release_their_bytes() {
        let ledger = IdempotencyLedger::with_byte_budget(1, 10_000);
        let first = RequestId::new("first");
        ledger.admit(&first);
        ledger.complete(&first, &result_with_log("first", 500));
        assert!(ledger.retained_bytes() > 500);
        ledger.admit(&RequestId::new("second"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.retained_bytes(), 0);
    }
}
