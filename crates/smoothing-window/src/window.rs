//! Bounded FIFO Window Implementation

use std::collections::VecDeque;

use serde::Serialize;

use crate::{clamp_unit, WindowError, DEFAULT_CAPACITY};

/// Bounded FIFO of probabilities in [0, 1], oldest first
///
/// Length never exceeds capacity; pushing at capacity evicts exactly the
/// oldest sample.
#[derive(Debug, Clone, Serialize)]
pub struct SmoothingWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SmoothingWindow {
    /// Create a new window with given capacity
    pub fn new(capacity: usize) -> Result<Self, WindowError> {
        if capacity == 0 {
            return Err(WindowError::ZeroCapacity);
        }
        Ok(Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        })
    }

    /// Create a window with default capacity (5 samples)
    pub fn with_default_capacity() -> Self {
        Self {
            samples: VecDeque::with_capacity(DEFAULT_CAPACITY + 1),
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Push a sample, returning the evicted oldest sample if the window was full
    pub fn push(&mut self, value: f32) -> Option<f32> {
        self.samples.push_back(clamp_unit(value));
        if self.samples.len() > self.capacity {
            self.samples.pop_front()
        } else {
            None
        }
    }

    /// Arithmetic mean of the current samples, `None` when empty
    pub fn mean(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|&v| f64::from(v)).sum();
        Some((sum / self.samples.len() as f64) as f32)
    }

    /// Samples oldest first
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Samples oldest first, copied out
    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }

    /// Get the number of samples currently in the window
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if window is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Check if window is full
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Get the window capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the window
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for SmoothingWindow {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
