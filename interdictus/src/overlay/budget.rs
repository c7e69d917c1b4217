//! Per-layer time and cancellation budget.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why an overlay stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("layer exceeded its time budget")]
    TimedOut,

    #[error("analysis was cancelled")]
    Cancelled,
}

/// Deadline and cancellation signal for one layer.
///
/// Checked cooperatively by the overlay; an exhausted budget stops the
/// layer at the next check without touching any shared state.
#[derive(Debug, Clone, Default)]
pub struct LayerBudget {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl LayerBudget {
    /// A budget that never runs out.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Budget starting now, with an optional timeout.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self {
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
            cancel: Some(cancel),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(Interrupted::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Interrupted::TimedOut);
        }
        Ok(())
    }
}
