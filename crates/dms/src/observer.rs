//! Result and error sinks for event-driven hosts

use crate::status::DetectionResult;

/// Receives pipeline output
///
/// `on_result` fires at most once per processed frame; `on_error` fires for
/// every recoverable failure inside a cycle.
pub trait PipelineObserver {
    fn on_result(&mut self, result: &DetectionResult);
    fn on_error(&mut self, message: &str);
}

/// Observer built from two closures
pub struct CallbackObserver<R, E> {
    on_result: R,
    on_error: E,
}

impl<R, E> CallbackObserver<R, E>
where
    R: FnMut(&DetectionResult),
    E: FnMut(&str),
{
    pub fn new(on_result: R, on_error: E) -> Self {
        Self { on_result, on_error }
    }
}

impl<R, E> PipelineObserver for CallbackObserver<R, E>
where
    R: FnMut(&DetectionResult),
    E: FnMut(&str),
{
    fn on_result(&mut self, result: &DetectionResult) {
        (self.on_result)(result)
    }

    fn on_error(&mut self, message: &str) {
        (self.on_error)(message)
    }
}

/// Collects everything it is told, for tests and batch runs
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub results: Vec<DetectionResult>,
    pub errors: Vec<String>,
}

impl PipelineObserver for RecordingObserver {
    fn on_result(&mut self, result: &DetectionResult) {
        self.results.push(*result);
    }

    fn on_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
