//! Progress events and cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One entry of the progress stream of a single invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub message: String,
    pub step: Option<String>,
    pub size_mb: Option<f64>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step: None,
            size_mb: None,
        }
    }

    pub fn with_step(mut self, step: &str) -> Self {
        self.step = Some(step.to_string());
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.size_mb = Some(bytes_to_mb(bytes));
        self
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}

/// Forwards events to the caller's sink and mirrors them into the log.
pub struct Progress<'a> {
    sink: &'a mut dyn FnMut(ProgressEvent),
}

impl<'a> Progress<'a> {
    pub fn new(sink: &'a mut dyn FnMut(ProgressEvent)) -> Self {
        Self { sink }
    }

    pub fn emit(&mut self, event: ProgressEvent) {
        log::info!("{}", event.message);
        (self.sink)(event);
    }

    pub fn message(&mut self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(message));
    }

    /// Failures go out as regular events too; the log line is a warning.
    pub fn failure(&mut self, event: ProgressEvent) {
        log::warn!("{}", event.message);
        (self.sink)(event);
    }
}

/// Shared flag a caller flips to abandon an in-flight invocation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Convenience for optional tokens threaded through the pipeline.
pub(crate) fn cancelled(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}
