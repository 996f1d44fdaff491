//! Load progress tracking
//!
//! The manager publishes its current phase here so another thread (a UI
//! overlay, say) can poll it while a load blocks.

use parking_lot::RwLock;
use std::sync::Arc;

/// Represents the current phase of a load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadPhase {
    /// No load has started yet
    Idle,

    /// Reading texture references ahead of geometry
    PreParsing,

    /// Parsing geometry while decode tasks run
    LoadingGeometry,

    /// Waiting for decode tasks, (finished, total)
    JoiningDecodes(usize, usize),

    /// Packing, recording and submitting texture uploads
    Uploading,

    /// Load completed successfully
    Completed,

    /// Load failed with an error message
    Failed(String),
}

/// Shared view of a manager's progress
#[derive(Debug, Clone)]
pub struct LoadProgress {
    phase: Arc<RwLock<LoadPhase>>,
}

impl Default for LoadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProgress {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(RwLock::new(LoadPhase::Idle)),
        }
    }

    /// Get the current phase
    pub fn phase(&self) -> LoadPhase {
        self.phase.read().clone()
    }

    pub(crate) fn set(&self, phase: LoadPhase) {
        log::trace!("Load phase: {phase:?}");
        *self.phase.write() = phase;
    }

    pub fn is_loading(&self) -> bool {
        !matches!(
            *self.phase.read(),
            LoadPhase::Idle | LoadPhase::Completed | LoadPhase::Failed(_)
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.phase.read(), LoadPhase::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.phase.read(), LoadPhase::Failed(_))
    }

    /// Coarse progress (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        match &*self.phase.read() {
            LoadPhase::Idle | LoadPhase::Failed(_) => 0.0,
            LoadPhase::PreParsing => 0.05,
            LoadPhase::LoadingGeometry => 0.2,
            LoadPhase::JoiningDecodes(done, total) => {
                let fraction = if *total == 0 {
                    1.0
                } else {
                    *done as f32 / *total as f32
                };
                0.5 + fraction * 0.3
            }
            LoadPhase::Uploading => 0.9,
            LoadPhase::Completed => 1.0,
        }
    }
}
