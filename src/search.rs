//! The ladder search driver.
//!
//! `Idle -> Estimating -> Trying(rung) -> {Succeeded, Exhausted}`. Every rung
//! starts again from the original input bytes; nothing carries over between
//! rungs except the best-so-far candidate.

use crate::error::{Error, Result};
use crate::ladder::{estimate_start, Rung};
use crate::progress::{bytes_to_mb, cancelled, CancellationToken, Progress, ProgressEvent};
use crate::result::{CompressionResult, STEP_ALREADY_UNDER_TARGET, STEP_NONE};

/// Produces one candidate document for one rung.
pub trait RungRunner<R: Rung> {
    /// Rejects input that no rung could ever handle. Called once, before
    /// the first rung, so that garbage input is a total failure.
    fn validate(&self, _input: &[u8]) -> Result<()> {
        Ok(())
    }

    fn run(&self, input: &[u8], rung: &R, progress: &mut Progress<'_>) -> Result<Vec<u8>>;
}

pub fn target_bytes(target_mb: f64) -> Result<u64> {
    if !target_mb.is_finite() || target_mb <= 0.0 {
        return Err(Error::InvalidTarget(target_mb));
    }
    Ok((target_mb * 1_048_576.0).floor() as u64)
}

pub struct LadderSearch<'l, R> {
    ladder: &'l [R],
    breakpoints: &'l [f64],
    cancel: Option<CancellationToken>,
}

struct Best {
    /// `None` while the original input is still the smallest thing seen
    bytes: Option<Vec<u8>>,
    size: u64,
    step: &'static str,
}

impl<'l, R: Rung> LadderSearch<'l, R> {
    pub fn new(ladder: &'l [R], breakpoints: &'l [f64]) -> Self {
        Self {
            ladder,
            breakpoints,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    pub fn run<F: RungRunner<R>>(
        &self,
        input: &[u8],
        target_mb: f64,
        runner: &F,
        progress: &mut Progress<'_>,
    ) -> CompressionResult {
        let original_size = input.len() as u64;
        let target = match target_bytes(target_mb) {
            Ok(t) => t,
            Err(e) => {
                progress.failure(ProgressEvent::new(e.to_string()));
                return CompressionResult::failed(original_size, e.to_string());
            }
        };

        progress.emit(
            ProgressEvent::new(format!("Original size: {:.2} MB", bytes_to_mb(original_size)))
                .with_size(original_size),
        );
        progress.message(format!("Target: {} MB", target_mb));

        if original_size <= target {
            progress.message("File already under target size, keeping it as-is.");
            return CompressionResult::reached(
                input.to_vec(),
                original_size,
                STEP_ALREADY_UNDER_TARGET,
            );
        }

        if let Err(e) = runner.validate(input) {
            progress.failure(ProgressEvent::new(e.to_string()));
            return CompressionResult::failed(original_size, e.to_string());
        }

        if self.ladder.is_empty() {
            return CompressionResult::exhausted(input.to_vec(), original_size, STEP_NONE);
        }

        let start = estimate_start(original_size, target, self.breakpoints, self.ladder.len());
        progress.message(format!(
            "Compression ratio needed: {:.1}x -> starting at step '{}'",
            original_size as f64 / target as f64,
            self.ladder[start].name()
        ));

        let mut best = Best {
            bytes: None,
            size: original_size,
            step: STEP_NONE,
        };

        for rung in &self.ladder[start..] {
            if cancelled(self.cancel.as_ref()) {
                return self.cancelled_result(original_size, progress);
            }

            let trying = format!("Trying step '{}' ({})...", rung.name(), rung.describe());
            progress.emit(ProgressEvent::new(trying).with_step(rung.name()));

            let candidate = match runner.run(input, rung, progress) {
                Ok(bytes) => bytes,
                Err(Error::Cancelled) => return self.cancelled_result(original_size, progress),
                Err(e) => {
                    progress.failure(
                        ProgressEvent::new(format!("  -> Step '{}' failed: {}", rung.name(), e))
                            .with_step(rung.name()),
                    );
                    continue;
                }
            };

            let size = candidate.len() as u64;
            progress.emit(
                ProgressEvent::new(format!("  -> {:.2} MB", bytes_to_mb(size)))
                    .with_step(rung.name())
                    .with_size(size),
            );

            if size <= target {
                progress.emit(
                    ProgressEvent::new("Target reached!")
                        .with_step(rung.name())
                        .with_size(size),
                );
                return CompressionResult::reached(candidate, original_size, rung.name());
            }

            if size < best.size {
                best = Best {
                    bytes: Some(candidate),
                    size,
                    step: rung.name(),
                };
            }
        }

        progress.emit(
            ProgressEvent::new(format!(
                "Target not reached. Best result: {:.2} MB (step: {})",
                bytes_to_mb(best.size),
                best.step
            ))
            .with_size(best.size),
        );
        let output = best.bytes.unwrap_or_else(|| input.to_vec());
        CompressionResult::exhausted(output, original_size, best.step)
    }

    fn cancelled_result(
        &self,
        original_size: u64,
        progress: &mut Progress<'_>,
    ) -> CompressionResult {
        progress.failure(ProgressEvent::new("Compression cancelled"));
        CompressionResult::failed(original_size, Error::Cancelled.to_string())
    }
}
