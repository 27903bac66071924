//! Plumbing shared by every test phase: cancellation, progress reporting
//! and the three-way phase outcome.

use crate::error::Error;
use crate::units::format_mb_s;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag shared between the caller and a phase.
///
/// Phases check it between trials, blocks and integrity units, so the
/// worst-case latency is one block of I/O.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. one set by a Ctrl+C handler
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The underlying shared flag
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Which phase is reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Speed probe
    Speed,
    /// Integrity verification
    Integrity,
    /// Capacity write pass
    CapacityWrite,
    /// Capacity verify pass
    CapacityVerify,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Speed => write!(f, "Speed test"),
            Phase::Integrity => write!(f, "Integrity test"),
            Phase::CapacityWrite => write!(f, "Writing capacity blocks"),
            Phase::CapacityVerify => write!(f, "Verifying capacity blocks"),
        }
    }
}

/// Progress callback type
pub type ProgressCallback = Box<dyn FnMut(&PhaseProgress) + Send>;

/// Progress information reported after each unit of work
#[derive(Debug, Clone)]
pub struct PhaseProgress {
    /// Phase reporting progress
    pub phase: Phase,
    /// Units (trials, files, blocks) finished so far
    pub completed: u64,
    /// Units planned
    pub total: u64,
    /// Bytes moved so far in this phase
    pub bytes: u64,
    /// Time since the phase started
    pub elapsed: Duration,
    /// Short description of the current step
    pub step: String,
}

impl PhaseProgress {
    /// Get completion percentage (0-100)
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64 * 100.0).min(100.0)
    }

    /// Average throughput so far in MB/s
    pub fn speed_mb_s(&self) -> f64 {
        crate::units::throughput_mb_s(self.bytes, self.elapsed)
    }

    /// Format speed for display
    pub fn speed_display(&self) -> String {
        format_mb_s(self.speed_mb_s())
    }
}

pub(crate) fn report(callback: &mut Option<ProgressCallback>, progress: PhaseProgress) {
    if let Some(ref mut callback) = callback {
        callback(&progress);
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// What a phase produced.
///
/// `Partial` carries real measurements from a run that was cancelled or that
/// hit I/O errors along the way.
#[derive(Debug)]
pub enum PhaseOutcome<T> {
    /// The phase ran to completion
    Complete(T),
    /// The phase was cancelled or hit I/O errors; `result` holds what was measured
    Partial {
        /// Measurements collected before stopping
        result: T,
        /// Whether the stop was a user cancellation
        cancelled: bool,
    },
    /// The phase produced no usable result
    Failed(Error),
}

impl<T> PhaseOutcome<T> {
    /// The result, complete or partial
    pub fn result(&self) -> Option<&T> {
        match self {
            PhaseOutcome::Complete(result) | PhaseOutcome::Partial { result, .. } => Some(result),
            PhaseOutcome::Failed(_) => None,
        }
    }

    /// Consume the outcome, keeping any result
    pub fn into_result(self) -> Option<T> {
        match self {
            PhaseOutcome::Complete(result) | PhaseOutcome::Partial { result, .. } => Some(result),
            PhaseOutcome::Failed(_) => None,
        }
    }

    /// Whether the phase ran to completion
    pub fn is_complete(&self) -> bool {
        matches!(self, PhaseOutcome::Complete(_))
    }

    /// Whether the phase stopped because of cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            PhaseOutcome::Partial { cancelled, .. } => *cancelled,
            PhaseOutcome::Failed(err) => err.is_cancelled(),
            PhaseOutcome::Complete(_) => false,
        }
    }

    /// The error of a failed phase
    pub fn error(&self) -> Option<&Error> {
        match self {
            PhaseOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// One-word status for logs and reports
    pub fn status(&self) -> &'static str {
        match self {
            PhaseOutcome::Complete(_) => "complete",
            PhaseOutcome::Partial {
                cancelled: true, ..
            } => "cancelled",
            PhaseOutcome::Partial { .. } => "partial",
            PhaseOutcome::Failed(err) if err.is_cancelled() => "cancelled",
            PhaseOutcome::Failed(_) => "failed",
        }
    }

    /// Keep whatever the phase produced, appending a note about failures
    /// and early stops to `notes`
    pub fn keep_noted(self, name: &str, notes: &mut Vec<String>) -> Option<T> {
        match self {
            PhaseOutcome::Complete(result) => Some(result),
            PhaseOutcome::Partial {
                result,
                cancelled: true,
            } => {
                notes.push(format!("{} cancelled", name));
                Some(result)
            }
            PhaseOutcome::Partial {
                result,
                cancelled: false,
            } => {
                notes.push(format!("{} incomplete after I/O errors", name));
                Some(result)
            }
            PhaseOutcome::Failed(e) if e.is_cancelled() => {
                notes.push(format!("{} cancelled", name));
                None
            }
            PhaseOutcome::Failed(e) => {
                notes.push(format!("{} failed: {}", name, e));
                None
            }
        }
    }
}
