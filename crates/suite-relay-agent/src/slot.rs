// crates/suite-relay-agent/src/slot.rs
// ============================================================================
// Module: Execution Slot
// Description: Single-permit execution gate with a bounded FIFO wait queue.
// Purpose: Guarantee at most one suite executes at a time.
// Dependencies: tokio::sync
// ============================================================================

//! ## Overview
//! The slot is a fair single-permit semaphore. A request that finds the slot
//! free runs immediately; otherwise it waits in FIFO order if fewer than
//! `max_queue_depth` requests are already waiting, and is refused as busy
//! when the queue is full. A waiter that gives up (its connection dropped)
//! releases its queue position.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Slot is held and the wait queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution slot is busy and the wait queue is full")]
pub struct SlotBusy;

/// Proof of exclusive access to the execution slot.
#[derive(Debug)]
pub struct SlotPermit {
    /// Underlying semaphore permit, released on drop.
    _permit: OwnedSemaphorePermit,
}

/// Single execution slot with a bounded wait queue.
#[derive(Debug)]
pub struct ExecutionSlot {
    /// Single-permit fair semaphore.
    semaphore: Arc<Semaphore>,
    /// Requests currently waiting.
    waiting: AtomicUsize,
    /// Maximum number of waiting requests.
    max_queue_depth: usize,
}

impl ExecutionSlot {
    /// Creates a free slot.
    #[must_use]
    pub fn new(max_queue_depth: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            waiting: AtomicUsize::new(0),
            max_queue_depth,
        }
    }

    /// Acquires the slot, waiting in line when allowed.
    ///
    /// # Errors
    ///
    /// Returns [`SlotBusy`] when the slot is held and the queue is full.
    pub async fn acquire(&self) -> Result<SlotPermit, SlotBusy> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(SlotPermit {
                _permit: permit,
            });
        }
        let _position = self.reserve_position()?;
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.map_err(|_| SlotBusy)?;
        Ok(SlotPermit {
            _permit: permit,
        })
    }

    /// Returns true when an execution holds the slot.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Returns the number of requests waiting for the slot.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Claims a queue position if one is free.
    fn reserve_position(&self) -> Result<QueuePosition<'_>, SlotBusy> {
        self.waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < self.max_queue_depth).then_some(count + 1)
            })
            .map_err(|_| SlotBusy)?;
        Ok(QueuePosition {
            waiting: &self.waiting,
        })
    }
}

/// Queue position released on drop, including when a waiter is cancelled.
struct QueuePosition<'a> {
    /// Shared waiting counter.
    waiting: &'a AtomicUsize,
}

impl Drop for QueuePosition<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
