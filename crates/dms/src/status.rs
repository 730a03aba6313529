//! Aggregation and open/closed decision

use std::fmt;

use serde::{Deserialize, Serialize};

/// Threshold used by the shipped model
pub const DEFAULT_OPEN_THRESHOLD: f32 = 0.4;

/// Eye status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EyeStatus {
    Open,
    Closed,
}

impl EyeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EyeStatus::Open => "OPEN",
            EyeStatus::Closed => "CLOSED",
        }
    }
}

/// Display color paired with a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusColor {
    Green,
    Red,
}

impl StatusColor {
    /// 0xAARRGGBB
    pub fn argb(&self) -> u32 {
        match self {
            StatusColor::Green => 0xFF00_FF00,
            StatusColor::Red => 0xFFFF_0000,
        }
    }
}

/// Terminal output of one pipeline cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub status: EyeStatus,
    /// Smoothed open-eye probability
    pub confidence: f32,
    pub color: StatusColor,
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eye: {}\nConfidence: {:.2}", self.status.as_str(), self.confidence)
    }
}

/// Mean of one frame's region confidences, `None` if no region survived
pub fn aggregate(confidences: &[f32]) -> Option<f32> {
    if confidences.is_empty() {
        return None;
    }
    let sum: f64 = confidences.iter().map(|&c| f64::from(c)).sum();
    Some((sum / confidences.len() as f64) as f32)
}

/// Thresholds a smoothed probability into a status
#[derive(Debug, Clone, Copy)]
pub struct StatusDecider {
    threshold: f32,
}

impl StatusDecider {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Open only when strictly above the threshold
    pub fn decide(&self, smoothed: f32) -> DetectionResult {
        if smoothed > self.threshold {
            DetectionResult {
                status: EyeStatus::Open,
                confidence: smoothed,
                color: StatusColor::Green,
            }
        } else {
            DetectionResult {
                status: EyeStatus::Closed,
                confidence: smoothed,
                color: StatusColor::Red,
            }
        }
    }
}

impl Default for StatusDecider {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate() {
        assert_eq!(aggregate(&[]), None);
        assert!((aggregate(&[0.2, 0.8]).unwrap() - 0.5).abs() < 1e-6);
        assert!((aggregate(&[0.9, 0.7]).unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(aggregate(&[0.3]), Some(0.3));
    }

    #[test]
    fn test_threshold_is_strict() {
        let decider = StatusDecider::default();

        let open = decider.decide(0.41);
        assert_eq!(open.status, EyeStatus::Open);
        assert_eq!(open.color, StatusColor::Green);

        let at = decider.decide(0.4);
        assert_eq!(at.status, EyeStatus::Closed);
        assert_eq!(at.color, StatusColor::Red);

        let below = decider.decide(0.39);
        assert_eq!(below.status, EyeStatus::Closed);
        assert_eq!(below.color, StatusColor::Red);
        assert_eq!(below.confidence, 0.39);
    }

    #[test]
    fn test_custom_threshold() {
        let decider = StatusDecider::new(0.7);
        assert_eq!(decider.decide(0.6).status, EyeStatus::Closed);
        assert_eq!(decider.decide(0.71).status, EyeStatus::Open);
    }

    #[test]
    fn test_display_text() {
        let result = StatusDecider::default().decide(0.8);
        assert_eq!(result.to_string(), "Eye: OPEN\nConfidence: 0.80");
    }
}
