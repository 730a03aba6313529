//! Eye-region detection seam

use image::GrayImage;
use tracing::{info, warn};

use crate::region::Region;
use crate::DmsError;

/// Proposes eye rectangles in a grayscale, histogram-equalized frame
///
/// Cascade detectors and the like plug in here. No ordering of the
/// returned rectangles is assumed.
pub trait EyeRegionDetector: Send {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Region>, DmsError>;
}

impl<F> EyeRegionDetector for F
where
    F: FnMut(&GrayImage) -> Result<Vec<Region>, DmsError> + Send,
{
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Region>, DmsError> {
        self(image)
    }
}

/// Fixed eye rectangles for a rigidly mounted cabin camera
#[derive(Debug, Clone)]
pub struct StaticRegionDetector {
    regions: Vec<Region>,
}

impl StaticRegionDetector {
    pub fn new(regions: Vec<Region>) -> Self {
        if regions.is_empty() {
            warn!("Static detector has no regions; every frame will reuse the last result");
        } else {
            info!("Static detector with {} eye regions", regions.len());
        }
        Self { regions }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

impl EyeRegionDetector for StaticRegionDetector {
    fn detect(&mut self, _image: &GrayImage) -> Result<Vec<Region>, DmsError> {
        Ok(self.regions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_detector_returns_configured() {
        let regions = vec![Region::new(1, 2, 3, 4), Region::new(5, 6, 7, 8)];
        let mut detector = StaticRegionDetector::new(regions.clone());
        let image = GrayImage::new(10, 10);
        assert_eq!(detector.detect(&image).unwrap(), regions);
    }

    #[test]
    fn test_closure_detector() {
        let mut calls = 0;
        let mut detector = |img: &GrayImage| {
            calls += 1;
            Ok::<_, DmsError>(vec![Region::new(0, 0, img.width() as i32, 1)])
        };
        let image = GrayImage::new(7, 3);
        let found = EyeRegionDetector::detect(&mut detector, &image).unwrap();
        assert_eq!(found, vec![Region::new(0, 0, 7, 1)]);
        assert_eq!(calls, 1);
    }
}
