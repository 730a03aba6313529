//! Frame sources and RAII frame leases

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::{CameraError, VideoFrame};

/// Platform release operation for a frame buffer
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Anything that can hand out captured frames
pub trait FrameSource {
    /// Next frame, or `None` when the source is exhausted
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CameraError>;
}

/// Captured frame with RAII cleanup
///
/// The release hook runs exactly once, when the lease is dropped, on every
/// exit path of whoever holds it.
pub struct CapturedFrame {
    frame: VideoFrame,
    release: Option<ReleaseHook>,
}

impl CapturedFrame {
    /// Wrap a frame whose buffer must be handed back to the platform
    pub fn new(frame: VideoFrame, release: ReleaseHook) -> Self {
        Self {
            frame,
            release: Some(release),
        }
    }

    /// Wrap a frame that owns its buffer outright
    pub fn unmanaged(frame: VideoFrame) -> Self {
        Self {
            frame,
            release: None,
        }
    }

    /// Borrow the decoded frame
    pub fn frame(&self) -> &VideoFrame {
        &self.frame
    }

    /// Get frame sequence number
    pub fn sequence(&self) -> u32 {
        self.frame.sequence
    }

    /// Release the frame now
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.frame.width)
            .field("height", &self.frame.height)
            .field("sequence", &self.frame.sequence)
            .field("managed", &self.release.is_some())
            .finish()
    }
}

impl Drop for CapturedFrame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Image files decoded from a directory, in lexical order
///
/// Stands in for a live camera when replaying recorded sessions.
pub struct ImageDirSource {
    paths: Vec<PathBuf>,
    next: usize,
    released: Arc<AtomicU64>,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

impl ImageDirSource {
    /// Scan a directory for image files
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CameraError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CameraError::Open(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();

        info!("Opened frame directory {} ({} frames)", dir.display(), paths.len());

        Ok(Self {
            paths,
            next: 0,
            released: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of frames in the directory
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if the directory held no frames
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Frames handed out and since released
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CameraError> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        let sequence = self.next as u32;
        self.next += 1;

        let image = image::open(path)
            .map_err(|e| CameraError::Decode(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let frame = VideoFrame::from_rgb_image(image, timestamp_ns, sequence);
        let released = Arc::clone(&self.released);

        Ok(Some(CapturedFrame::new(
            frame,
            Box::new(move || {
                released.fetch_add(1, Ordering::Relaxed);
                debug!("Released frame {}", sequence);
            }),
        )))
    }
}
