//! Progress reporting for an analysis run.
//!
//! Progress is delivered through a callback so the caller can wire it to a
//! terminal, a log, or nothing at all.

use std::sync::Arc;

/// Progress callback. Must be `Send + Sync`; it is invoked from worker threads.
pub type AnalysisProgressCallback = Arc<dyn Fn(AnalysisProgress) + Send + Sync>;

/// Phase of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    /// Layers are being listed.
    Listing,
    /// Layers are being loaded and overlaid.
    Overlaying,
    /// All layers have been processed.
    Complete,
}

/// Snapshot of analysis progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisProgress {
    pub phase: AnalysisPhase,
    /// Layer that just started or finished, if any.
    pub current_layer: Option<String>,
    pub layers_complete: usize,
    pub layers_total: usize,
}

impl AnalysisProgress {
    pub fn listing() -> Self {
        Self {
            phase: AnalysisPhase::Listing,
            current_layer: None,
            layers_complete: 0,
            layers_total: 0,
        }
    }

    pub fn layer(layer: &str, layers_complete: usize, layers_total: usize) -> Self {
        Self {
            phase: AnalysisPhase::Overlaying,
            current_layer: Some(layer.to_string()),
            layers_complete,
            layers_total,
        }
    }

    pub fn complete(layers_total: usize) -> Self {
        Self {
            phase: AnalysisPhase::Complete,
            current_layer: None,
            layers_complete: layers_total,
            layers_total,
        }
    }

    /// Completion in percent, 100 when there is nothing to do.
    pub fn percent(&self) -> u8 {
        if self.layers_total == 0 {
            return 100;
        }
        ((self.layers_complete * 100) / self.layers_total).min(100) as u8
    }
}
