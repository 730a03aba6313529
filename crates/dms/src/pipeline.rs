//! Eye-state pipeline: one frame in, one smoothed status out

use camera_capture::{CapturedFrame, VideoFrame};
use inference_engine::InferenceBackend;
use smoothing_window::TemporalSmoother;
use tracing::{debug, error, warn};

use crate::classifier::EyeClassifier;
use crate::detector::EyeRegionDetector;
use crate::observer::PipelineObserver;
use crate::region::{extract_regions, Region};
use crate::status::{aggregate, DetectionResult, StatusDecider};
use crate::{DmsConfig, DmsError};

/// How a cycle produced its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// At least one region was classified; the smoother advanced
    Fresh,
    /// No usable region; the previous result stands
    Reused,
}

/// Everything one cycle learned about a frame
#[derive(Debug)]
pub struct FrameAnalysis {
    pub result: DetectionResult,
    pub outcome: CycleOutcome,
    /// Rectangles proposed by the detector
    pub regions_detected: usize,
    /// Regions that yielded a confidence
    pub regions_classified: usize,
    /// Regions that failed, with the reason
    pub region_errors: Vec<(Region, DmsError)>,
}

/// Detector, classifier, smoother and decider for one camera session
///
/// Owns the only cross-cycle state: the smoothing window and the last
/// emitted result. Not meant to be shared between sessions.
pub struct EyeStatePipeline<D, B> {
    detector: D,
    classifier: EyeClassifier<B>,
    smoother: TemporalSmoother,
    decider: StatusDecider,
    last_result: DetectionResult,
}

impl<D, B> EyeStatePipeline<D, B>
where
    D: EyeRegionDetector,
    B: InferenceBackend,
{
    /// Build a pipeline; any invalid collaborator or config fails construction
    pub fn new(config: &DmsConfig, detector: D, backend: B) -> Result<Self, DmsError> {
        config.validate()?;

        let classifier = EyeClassifier::new(backend, config.image_size)?;
        let smoother = TemporalSmoother::new(config.window_capacity)
            .map_err(|e| DmsError::Initialization(e.to_string()))?;
        let decider = StatusDecider::new(config.open_threshold);
        let last_result = decider.decide(smoother.current());

        Ok(Self {
            detector,
            classifier,
            smoother,
            decider,
            last_result,
        })
    }

    /// Run one cycle on a frame
    ///
    /// Per-region failures are collected in the returned analysis. An `Err`
    /// means the whole cycle was aborted and no state changed.
    pub fn analyze(&mut self, frame: &VideoFrame) -> Result<FrameAnalysis, DmsError> {
        let detector_input = frame.to_detector_input()?;
        let regions = self.detector.detect(&detector_input)?;
        let regions_detected = regions.len();

        let mut confidences = Vec::with_capacity(regions_detected);
        let mut region_errors = Vec::new();

        for crop in extract_regions(frame, regions) {
            match self.classifier.classify(&crop.image) {
                Ok(classification) => confidences.push(classification.confidence),
                Err(e) => {
                    warn!("Region {:?} skipped: {}", crop.region, e);
                    metrics::counter!("dms_region_errors_total").increment(1);
                    region_errors.push((crop.region, e));
                }
            }
        }

        let (result, outcome) = match aggregate(&confidences) {
            Some(frame_probability) => {
                let smoothed = self.smoother.update(frame_probability);
                let result = self.decider.decide(smoothed);
                self.last_result = result;
                metrics::gauge!("dms_smoothed_confidence").set(f64::from(smoothed));
                debug!(
                    "Frame {}: p={:.3} smoothed={:.3} -> {}",
                    frame.sequence,
                    frame_probability,
                    smoothed,
                    result.status.as_str()
                );
                (result, CycleOutcome::Fresh)
            }
            None => {
                metrics::counter!("dms_frames_reused_total").increment(1);
                debug!("Frame {}: no usable eye regions, reusing last result", frame.sequence);
                (self.last_result, CycleOutcome::Reused)
            }
        };

        metrics::counter!("dms_frames_processed_total").increment(1);

        Ok(FrameAnalysis {
            result,
            outcome,
            regions_detected,
            regions_classified: confidences.len(),
            region_errors,
        })
    }

    /// Run one cycle on a captured frame and report through an observer
    ///
    /// The frame is released before returning, whatever the outcome.
    pub fn process(
        &mut self,
        captured: CapturedFrame,
        observer: &mut dyn PipelineObserver,
    ) -> Result<DetectionResult, DmsError> {
        let outcome = self.analyze(captured.frame());
        captured.release();

        match outcome {
            Ok(analysis) => {
                for (region, e) in &analysis.region_errors {
                    observer.on_error(&format!("Inference error at {:?}: {}", region, e));
                }
                observer.on_result(&analysis.result);
                Ok(analysis.result)
            }
            Err(e) => {
                error!("Analysis error: {}", e);
                observer.on_error(&format!("Analysis error: {}", e));
                Err(e)
            }
        }
    }

    /// Last emitted result (the initial CLOSED/0.0 before any fresh frame)
    pub fn last_result(&self) -> DetectionResult {
        self.last_result
    }

    /// Borrow the smoother
    pub fn smoother(&self) -> &TemporalSmoother {
        &self.smoother
    }

    /// Borrow the classifier
    pub fn classifier(&self) -> &EyeClassifier<B> {
        &self.classifier
    }

    /// Forget all history, as if newly constructed
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last_result = self.decider.decide(self.smoother.current());
    }
}
