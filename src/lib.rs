//! Shrink PDFs to a target size.
//!
//! The text-preserving path re-encodes embedded images along a fixed ladder
//! of (resolution cap, JPEG quality) rungs, one independent trial per rung,
//! and stops at the first rung that fits. Pages can also be rasterized as a
//! last resort, and Ghostscript is used when it is installed.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod ladder;
pub mod progress;
pub mod raster;
pub mod result;
pub mod rewrite;
pub mod search;
pub mod transcode;
pub mod wasm;

use std::sync::mpsc;
use std::thread;

pub use backend::{
    CompressionBackend, Compressor, GhostscriptBackend, InProcessBackend, RasterBackend,
};
pub use config::{BackendChoice, Mode, Settings};
pub use error::{Error, Result, TranscodeError};
pub use ladder::{CompressionStep, RasterStep, COMPRESSION_LADDER, RASTER_LADDER};
pub use progress::{CancellationToken, Progress, ProgressEvent};
pub use raster::{PageRenderer, RenderedPage};
pub use result::CompressionResult;

/// Run the in-process image ladder on `input`.
pub fn compress(
    input: &[u8],
    target_mb: f64,
    on_progress: &mut dyn FnMut(ProgressEvent),
) -> CompressionResult {
    let mut progress = Progress::new(on_progress);
    InProcessBackend::new().compress(input, target_mb, &mut progress)
}

/// Run the raster ladder on `input`, rendering pages with `renderer`.
pub fn compress_rasterized(
    input: &[u8],
    target_mb: f64,
    renderer: &dyn PageRenderer,
    on_progress: &mut dyn FnMut(ProgressEvent),
) -> CompressionResult {
    let mut progress = Progress::new(on_progress);
    RasterBackend::new(renderer).compress(input, target_mb, &mut progress)
}

/// Compression running on its own thread.
///
/// Iterating yields progress events in order until the run is over;
/// [`CompressionJob::finish`] then returns the result.
pub struct CompressionJob {
    events: mpsc::Receiver<ProgressEvent>,
    handle: thread::JoinHandle<CompressionResult>,
    cancel: CancellationToken,
    original_size: u64,
}

impl CompressionJob {
    /// Ask the run to stop at the next rung, image or page boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the worker. Call after iterating to the end; events not yet
    /// consumed are discarded. Use [`CompressionJob::finish_with_events`] to
    /// keep them.
    pub fn finish(self) -> CompressionResult {
        self.finish_with_events().0
    }

    /// Wait for the worker and return the result together with every event
    /// the caller has not consumed yet, in order.
    pub fn finish_with_events(self) -> (CompressionResult, Vec<ProgressEvent>) {
        let CompressionJob {
            events,
            handle,
            original_size,
            ..
        } = self;
        let result = match handle.join() {
            Ok(result) => result,
            Err(_) => CompressionResult::failed(original_size, "compression worker panicked"),
        };
        // The sender is gone once the worker has finished
        (result, events.iter().collect())
    }
}

impl Iterator for CompressionJob {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        self.events.recv().ok()
    }
}

/// Start compressing `input` with `settings` on a worker thread.
pub fn spawn_compress(input: Vec<u8>, settings: Settings) -> CompressionJob {
    let cancel = settings.cancel.clone().unwrap_or_default();
    let settings = settings.with_cancellation(cancel.clone());
    let original_size = input.len() as u64;
    let (tx, events) = mpsc::channel();

    let handle = thread::spawn(move || {
        // A dropped receiver only means nobody is listening any more.
        let mut sink = |event: ProgressEvent| {
            let _ = tx.send(event);
        };
        let mut progress = Progress::new(&mut sink);
        Compressor::new(settings).compress(&input, &mut progress)
    });

    CompressionJob {
        events,
        handle,
        cancel,
        original_size,
    }
}
