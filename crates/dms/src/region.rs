//! Eye regions and crop extraction

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rectangle in frame coordinates, as proposed by an eye detector
///
/// Signed so detectors may propose boxes hanging off the top or left edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Clamp to a `frame_width` x `frame_height` frame
    ///
    /// x and y are raised to 0, width and height are capped at the distance
    /// to the right and bottom edges. Returns `None` if nothing is left.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let x = i64::from(self.x).max(0);
        let y = i64::from(self.y).max(0);
        let width = i64::from(self.width).min(i64::from(frame_width) - x);
        let height = i64::from(self.height).min(i64::from(frame_height) - y);

        if width <= 0 || height <= 0 {
            return None;
        }

        // Every value is now within [0, frame dimension] and fits in i32
        Some(Region {
            x: x as i32,
            y: y as i32,
            width: width as i32,
            height: height as i32,
        })
    }
}

/// One surviving region and its pixels
#[derive(Debug, Clone)]
pub struct EyeCrop {
    /// Region after clamping
    pub region: Region,
    /// Cropped RGB sub-image
    pub image: VideoFrame,
}

/// Lazy crop sequence over one frame, in input order
pub struct RegionExtractor<'a, I> {
    frame: &'a VideoFrame,
    regions: I,
}

impl<'a, I> Iterator for RegionExtractor<'a, I>
where
    I: Iterator<Item = Region>,
{
    type Item = EyeCrop;

    fn next(&mut self) -> Option<EyeCrop> {
        for region in self.regions.by_ref() {
            let Some(clamped) = region.clamp_to(self.frame.width, self.frame.height) else {
                debug!("Dropping degenerate region {:?}", region);
                continue;
            };

            let crop = self.frame.crop(
                clamped.x as u32,
                clamped.y as u32,
                clamped.width as u32,
                clamped.height as u32,
            );
            match crop {
                Some(image) => {
                    return Some(EyeCrop {
                        region: clamped,
                        image,
                    })
                }
                None => debug!("Region {:?} could not be cropped", clamped),
            }
        }
        None
    }
}

/// Clamp each region to the frame and crop it, dropping degenerate ones
pub fn extract_regions<I>(frame: &VideoFrame, regions: I) -> RegionExtractor<'_, I::IntoIter>
where
    I: IntoIterator<Item = Region>,
{
    RegionExtractor {
        frame,
        regions: regions.into_iter(),
    }
}
