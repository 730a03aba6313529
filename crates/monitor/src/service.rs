//! Detection service: start/stop, frame intake, and status reporting

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use camera_capture::CapturedFrame;
use dms::{
    DetectionResult, EyeRegionDetector, EyeStatePipeline, FrameGate, GateGuard, PipelineObserver,
};
use inference_engine::InferenceBackend;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives everything the service reports
pub trait DetectionCallback: Send + Sync {
    fn on_result(&self, result: &DetectionResult);
    fn on_error(&self, message: &str);
    fn on_status(&self, enabled: bool);
}

/// Callback that only logs
pub struct LogCallback;

impl DetectionCallback for LogCallback {
    fn on_result(&self, result: &DetectionResult) {
        info!(
            "Eye: {} confidence={:.2} color={:?}",
            result.status.as_str(),
            result.confidence,
            result.color
        );
    }

    fn on_error(&self, message: &str) {
        error!("Error: {}", message);
    }

    fn on_status(&self, enabled: bool) {
        info!("Eye detection {}", if enabled { "enabled" } else { "disabled" });
    }
}

/// Service state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
    /// Running, but the last cycles kept failing
    Error(String),
}

struct Job {
    frame: CapturedFrame,
    _slot: GateGuard,
}

struct Shared {
    callback: Arc<dyn DetectionCallback>,
    state: Mutex<MonitorState>,
    consecutive_failures: Mutex<u32>,
    escalation_threshold: u32,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_cycle(&self, failure: Option<String>) {
        let escalated = {
            let mut failures = self
                .consecutive_failures
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let mut state = self.state();

            match failure {
                None => {
                    *failures = 0;
                    if matches!(*state, MonitorState::Error(_)) {
                        info!("Detection recovered");
                        *state = MonitorState::Running;
                    }
                    None
                }
                Some(message) => {
                    *failures += 1;
                    if *failures >= self.escalation_threshold && *state == MonitorState::Running {
                        error!("{} consecutive failed cycles, entering error state", *failures);
                        *state = MonitorState::Error(message.clone());
                        Some(format!("{} consecutive failed cycles: {}", *failures, message))
                    } else {
                        None
                    }
                }
            }
        };

        // Callbacks run without the locks held
        if let Some(message) = escalated {
            self.callback.on_error(&message);
        }
    }

    /// The worker is gone while the service still counts as started
    fn worker_lost(&self, reason: &str) {
        let message = format!("Detection worker unavailable: {}", reason);
        {
            let mut state = self.state();
            if *state == MonitorState::Error(message.clone()) {
                return;
            }
            error!("{}", message);
            *state = MonitorState::Error(message.clone());
        }
        self.callback.on_error(&message);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Forwards one cycle's output to the callback and remembers the last error
struct CycleObserver<'a> {
    callback: &'a dyn DetectionCallback,
    last_error: Option<String>,
}

impl PipelineObserver for CycleObserver<'_> {
    fn on_result(&mut self, result: &DetectionResult) {
        self.callback.on_result(result);
    }

    fn on_error(&mut self, message: &str) {
        self.callback.on_error(message);
        self.last_error = Some(message.to_string());
    }
}

/// Background eye-detection service for one camera session
pub struct DetectionService<D, B> {
    pipeline: Option<EyeStatePipeline<D, B>>,
    shared: Arc<Shared>,
    gate: FrameGate,
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<EyeStatePipeline<D, B>>>,
}

impl<D, B> DetectionService<D, B>
where
    D: EyeRegionDetector + 'static,
    B: InferenceBackend + 'static,
{
    pub fn new(
        pipeline: EyeStatePipeline<D, B>,
        callback: Arc<dyn DetectionCallback>,
        escalation_threshold: u32,
    ) -> Self {
        Self {
            pipeline: Some(pipeline),
            shared: Arc::new(Shared {
                callback,
                state: Mutex::new(MonitorState::Stopped),
                consecutive_failures: Mutex::new(0),
                escalation_threshold: escalation_threshold.max(1),
            }),
            gate: FrameGate::new(),
            sender: None,
            worker: None,
        }
    }

    /// Start the detection worker
    pub fn start(&mut self) -> Result<(), crate::MonitorError> {
        if self.worker.is_some() {
            return Err(crate::MonitorError::AlreadyRunning);
        }
        let Some(pipeline) = self.pipeline.take() else {
            return Err(crate::MonitorError::Worker("pipeline lost by a failed worker".into()));
        };

        // One slot: the gate already guarantees at most one job in flight
        let (tx, rx) = mpsc::channel(1);
        let shared = Arc::clone(&self.shared);
        self.worker = Some(tokio::task::spawn_blocking(move || {
            run_worker(pipeline, rx, shared)
        }));
        self.sender = Some(tx);

        *self.shared.consecutive_failures.lock().unwrap_or_else(|e| e.into_inner()) = 0;
        *self.shared.state() = MonitorState::Running;
        info!("Detection started");
        self.shared.callback.on_status(true);
        Ok(())
    }

    /// Stop the worker once its current cycle completes
    pub async fn stop(&mut self) -> Result<(), crate::MonitorError> {
        let Some(worker) = self.worker.take() else {
            return Err(crate::MonitorError::NotRunning);
        };
        self.sender = None;

        let pipeline = match worker.await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.shared.worker_lost(&e.to_string());
                return Err(crate::MonitorError::Worker(e.to_string()));
            }
        };
        self.pipeline = Some(pipeline);

        *self.shared.state() = MonitorState::Stopped;
        info!("Detection stopped");
        self.shared.callback.on_status(false);
        Ok(())
    }

    /// Hand a frame to the worker
    ///
    /// Returns `false` when the frame was dropped (stopped, or a cycle is
    /// still in flight). Dropped frames are released immediately.
    pub fn submit(&self, frame: CapturedFrame) -> bool {
        let Some(sender) = &self.sender else {
            debug!("Frame {} dropped: detection stopped", frame.sequence());
            return false;
        };

        let Some(slot) = self.gate.try_acquire() else {
            metrics::counter!("dms_frames_dropped_total").increment(1);
            debug!("Frame {} dropped: previous frame still processing", frame.sequence());
            return false;
        };

        match sender.try_send(Job { frame, _slot: slot }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                metrics::counter!("dms_frames_dropped_total").increment(1);
                warn!("Frame dropped: worker queue full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                metrics::counter!("dms_frames_dropped_total").increment(1);
                self.shared.worker_lost("worker exited");
                false
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.worker.is_some()
    }

    /// Whether a frame is being processed right now
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn state(&self) -> MonitorState {
        self.shared.state().clone()
    }

    /// Pipeline, while stopped
    pub fn pipeline(&self) -> Option<&EyeStatePipeline<D, B>> {
        self.pipeline.as_ref()
    }
}

fn run_worker<D, B>(
    mut pipeline: EyeStatePipeline<D, B>,
    mut rx: mpsc::Receiver<Job>,
    shared: Arc<Shared>,
) -> EyeStatePipeline<D, B>
where
    D: EyeRegionDetector,
    B: InferenceBackend,
{
    debug!("Detection worker running");
    while let Some(Job { frame, _slot }) = rx.blocking_recv() {
        let mut observer = CycleObserver {
            callback: shared.callback.as_ref(),
            last_error: None,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pipeline.process(frame, &mut observer)
        }));

        let failure = match outcome {
            Ok(Err(e)) => Some(e.to_string()),
            Ok(Ok(_)) => observer.last_error,
            Err(payload) => {
                // The frame was released during unwinding; history may be half-updated
                let message = format!("Analysis error: pipeline panicked: {}", panic_message(payload.as_ref()));
                error!("{}", message);
                pipeline.reset();
                shared.callback.on_error(&message);
                Some(message)
            }
        };
        shared.record_cycle(failure);
        // _slot drops here, freeing the gate for the next frame
    }
    debug!("Detection worker exiting");
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::VideoFrame;
    use dms::{DmsConfig, DmsError, EyeStatus, Region, StaticRegionDetector};
    use image::GrayImage;
    use inference_engine::MockBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    const SIZE: u32 = 8;

    #[derive(Debug)]
    enum Event {
        Result(DetectionResult),
        Error(String),
        Status(bool),
    }

    struct ChannelCallback {
        tx: Mutex<std_mpsc::Sender<Event>>,
    }

    impl ChannelCallback {
        fn new() -> (Arc<Self>, std_mpsc::Receiver<Event>) {
            let (tx, rx) = std_mpsc::channel();
            (Arc::new(Self { tx: Mutex::new(tx) }), rx)
        }

        fn send(&self, event: Event) {
            let _ = self.tx.lock().unwrap().send(event);
        }
    }

    impl DetectionCallback for ChannelCallback {
        fn on_result(&self, result: &DetectionResult) {
            self.send(Event::Result(*result));
        }

        fn on_error(&self, message: &str) {
            self.send(Event::Error(message.to_string()));
        }

        fn on_status(&self, enabled: bool) {
            self.send(Event::Status(enabled));
        }
    }

    fn config() -> DmsConfig {
        DmsConfig {
            image_size: SIZE,
            ..Default::default()
        }
    }

    fn captured(released: &Arc<AtomicUsize>) -> CapturedFrame {
        let c = Arc::clone(released);
        let frame = VideoFrame::new(vec![90; 32 * 24 * 3], 32, 24, 0, 0);
        CapturedFrame::new(frame, Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn next_event(rx: &std_mpsc::Receiver<Event>) -> Event {
        rx.recv_timeout(Duration::from_secs(5)).expect("no event from service")
    }

    async fn wait_idle<D, B>(service: &DetectionService<D, B>)
    where
        D: EyeRegionDetector + 'static,
        B: InferenceBackend + 'static,
    {
        for _ in 0..500 {
            if !service.is_busy() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("service stayed busy");
    }

    #[tokio::test]
    async fn test_start_process_stop() {
        let detector = StaticRegionDetector::new(vec![Region::new(4, 4, 12, 8)]);
        let pipeline =
            EyeStatePipeline::new(&config(), detector, MockBackend::constant(0.9, SIZE as usize)).unwrap();
        let (callback, events) = ChannelCallback::new();
        let mut service = DetectionService::new(pipeline, callback, 3);
        let released = Arc::new(AtomicUsize::new(0));

        assert!(!service.submit(captured(&released)));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        service.start().unwrap();
        assert!(matches!(next_event(&events), Event::Status(true)));
        assert_eq!(service.state(), MonitorState::Running);
        assert!(matches!(service.start(), Err(crate::MonitorError::AlreadyRunning)));

        assert!(service.submit(captured(&released)));
        match next_event(&events) {
            Event::Result(result) => {
                assert_eq!(result.status, EyeStatus::Open);
                assert!((result.confidence - 0.9).abs() < 1e-6);
            }
            other => panic!("unexpected event {:?}", other),
        }

        service.stop().await.unwrap();
        assert!(matches!(next_event(&events), Event::Status(false)));
        assert_eq!(service.state(), MonitorState::Stopped);
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_eq!(service.pipeline().unwrap().smoother().window().len(), 1);
        assert!(matches!(service.stop().await, Err(crate::MonitorError::NotRunning)));
    }

    #[tokio::test]
    async fn test_busy_worker_drops_new_frames() {
        let (hold_tx, hold_rx) = std_mpsc::channel::<()>();
        let (entered_tx, entered_rx) = std_mpsc::channel::<()>();
        let detector = move |_: &GrayImage| {
            let _ = entered_tx.send(());
            let _ = hold_rx.recv();
            Ok::<_, DmsError>(vec![Region::new(0, 0, 8, 8)])
        };
        let pipeline =
            EyeStatePipeline::new(&config(), detector, MockBackend::constant(0.2, SIZE as usize)).unwrap();
        let (callback, events) = ChannelCallback::new();
        let mut service = DetectionService::new(pipeline, callback, 3);
        let released = Arc::new(AtomicUsize::new(0));

        service.start().unwrap();
        assert!(matches!(next_event(&events), Event::Status(true)));

        assert!(service.submit(captured(&released)));
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(service.is_busy());

        // Dropped, not queued, and released right away
        assert!(!service.submit(captured(&released)));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        hold_tx.send(()).unwrap();
        assert!(matches!(next_event(&events), Event::Result(_)));
        wait_idle(&service).await;

        assert!(service.submit(captured(&released)));
        hold_tx.send(()).unwrap();
        assert!(matches!(next_event(&events), Event::Result(_)));

        service.stop().await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 3);
        // Only the two accepted frames reached the smoother
        assert_eq!(service.pipeline().unwrap().smoother().window().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_failures_escalate_then_recover() {
        let mut calls = 0;
        let detector = move |_: &GrayImage| {
            calls += 1;
            if calls <= 3 {
                Err(DmsError::Detector("cascade unavailable".into()))
            } else {
                Ok(vec![Region::new(0, 0, 8, 8)])
            }
        };
        let pipeline =
            EyeStatePipeline::new(&config(), detector, MockBackend::constant(0.8, SIZE as usize)).unwrap();
        let (callback, events) = ChannelCallback::new();
        let mut service = DetectionService::new(pipeline, callback, 3);
        let released = Arc::new(AtomicUsize::new(0));

        service.start().unwrap();
        assert!(matches!(next_event(&events), Event::Status(true)));

        for i in 0..3 {
            assert!(service.submit(captured(&released)));
            match next_event(&events) {
                Event::Error(message) => assert!(message.contains("cascade unavailable")),
                other => panic!("unexpected event {:?}", other),
            }
            wait_idle(&service).await;
            if i < 2 {
                assert_eq!(service.state(), MonitorState::Running);
            }
        }
        assert!(matches!(service.state(), MonitorState::Error(_)));
        match next_event(&events) {
            Event::Error(message) => assert!(message.starts_with("3 consecutive failed cycles")),
            other => panic!("unexpected event {:?}", other),
        }

        assert!(service.submit(captured(&released)));
        assert!(matches!(next_event(&events), Event::Result(_)));
        wait_idle(&service).await;
        assert_eq!(service.state(), MonitorState::Running);

        service.stop().await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_panicking_detector_is_reported_and_survived() {
        let mut calls = 0;
        let detector = move |_: &GrayImage| {
            calls += 1;
            if calls == 1 {
                panic!("detector crashed");
            }
            Ok::<_, DmsError>(vec![Region::new(0, 0, 8, 8)])
        };
        let pipeline =
            EyeStatePipeline::new(&config(), detector, MockBackend::constant(0.7, SIZE as usize)).unwrap();
        let (callback, events) = ChannelCallback::new();
        let mut service = DetectionService::new(pipeline, callback, 1);
        let released = Arc::new(AtomicUsize::new(0));

        service.start().unwrap();
        assert!(matches!(next_event(&events), Event::Status(true)));

        assert!(service.submit(captured(&released)));
        match next_event(&events) {
            Event::Error(message) => assert!(message.contains("detector crashed")),
            other => panic!("unexpected event {:?}", other),
        }
        match next_event(&events) {
            Event::Error(message) => assert!(message.starts_with("1 consecutive failed cycles")),
            other => panic!("unexpected event {:?}", other),
        }
        wait_idle(&service).await;
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(matches!(service.state(), MonitorState::Error(_)));
        assert!(service.is_enabled());

        // The worker is still alive and recovers on the next clean frame
        assert!(service.submit(captured(&released)));
        match next_event(&events) {
            Event::Result(result) => assert!((result.confidence - 0.7).abs() < 1e-6),
            other => panic!("unexpected event {:?}", other),
        }
        wait_idle(&service).await;
        assert_eq!(service.state(), MonitorState::Running);

        service.stop().await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 2);
        service.start().unwrap();
        service.stop().await.unwrap();
    }

    /// Panics in the two worker-side error reports, then behaves
    struct FragileCallback {
        inner: Arc<ChannelCallback>,
        errors: AtomicUsize,
    }

    impl DetectionCallback for FragileCallback {
        fn on_result(&self, result: &DetectionResult) {
            self.inner.on_result(result);
        }

        fn on_error(&self, message: &str) {
            if self.errors.fetch_add(1, Ordering::SeqCst) < 2 {
                panic!("sink failed");
            }
            self.inner.on_error(message);
        }

        fn on_status(&self, enabled: bool) {
            self.inner.on_status(enabled);
        }
    }

    #[tokio::test]
    async fn test_dead_worker_surfaces_error_state() {
        let detector = |_: &GrayImage| -> Result<Vec<Region>, DmsError> {
            Err(DmsError::Detector("no cascade".into()))
        };
        let pipeline =
            EyeStatePipeline::new(&config(), detector, MockBackend::constant(0.7, SIZE as usize)).unwrap();
        let (inner, events) = ChannelCallback::new();
        let callback = Arc::new(FragileCallback {
            inner,
            errors: AtomicUsize::new(0),
        });
        let mut service = DetectionService::new(pipeline, callback, 3);
        let released = Arc::new(AtomicUsize::new(0));

        service.start().unwrap();
        assert!(matches!(next_event(&events), Event::Status(true)));

        // The panic report itself panics outside the cycle guard, killing the worker
        assert!(service.submit(captured(&released)));
        wait_idle(&service).await;

        let mut state = service.state();
        for _ in 0..500 {
            service.submit(captured(&released));
            state = service.state();
            if matches!(state, MonitorState::Error(_)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        match state {
            MonitorState::Error(message) => assert!(message.contains("worker")),
            other => panic!("unexpected state {:?}", other),
        }
        match next_event(&events) {
            Event::Error(message) => assert!(message.contains("worker")),
            other => panic!("unexpected event {:?}", other),
        }

        // Every submitted frame was released, none silently kept
        wait_idle(&service).await;
        assert!(!service.submit(captured(&released)));
        let submitted = released.load(Ordering::SeqCst);
        assert!(submitted >= 2);

        assert!(matches!(service.stop().await, Err(crate::MonitorError::Worker(_))));
        assert!(matches!(service.start(), Err(crate::MonitorError::Worker(_))));
    }
}
