//! Moving-average smoother over frame-level probabilities

use tracing::debug;

use crate::{SmoothingWindow, WindowError};

/// Moving average over the last `capacity` frame-level probabilities
///
/// Single writer: every `push` is followed by a `current` read in the same
/// cycle, so callers own the smoother exclusively (`&mut self`).
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    window: SmoothingWindow,
}

impl TemporalSmoother {
    /// Create a smoother with the given window capacity
    pub fn new(capacity: usize) -> Result<Self, WindowError> {
        Ok(Self {
            window: SmoothingWindow::new(capacity)?,
        })
    }

    /// Append a frame-level probability
    pub fn push(&mut self, value: f32) {
        if let Some(evicted) = self.window.push(value) {
            debug!("Smoothing window evicted {:.3}", evicted);
        }
    }

    /// Mean of the window, or 0.0 before the first sample
    pub fn current(&self) -> f32 {
        self.window.mean().unwrap_or(0.0)
    }

    /// Push then read, as one cycle step
    pub fn update(&mut self, value: f32) -> f32 {
        self.push(value);
        self.current()
    }

    /// Borrow the underlying window
    pub fn window(&self) -> &SmoothingWindow {
        &self.window
    }

    /// Drop all history
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self {
            window: SmoothingWindow::with_default_capacity(),
        }
    }
}
