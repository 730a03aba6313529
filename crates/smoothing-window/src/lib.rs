//! Smoothing Window
//!
//! Bounded FIFO of recent frame-level eye-openness probabilities and the
//! moving-average smoother built on top of it.

mod smoother;
mod window;

pub use smoother::TemporalSmoother;
pub use window::SmoothingWindow;

use thiserror::Error;

/// Default window capacity (5 frames)
pub const DEFAULT_CAPACITY: usize = 5;

/// Errors constructing a window
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("Window capacity must be at least 1")]
    ZeroCapacity,
}

/// Clamp a probability into [0, 1]; NaN maps to 0
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
