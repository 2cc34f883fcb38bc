use crate::progress::bytes_to_mb;

pub const STEP_ALREADY_UNDER_TARGET: &str = "none (already under target)";
pub const STEP_NONE: &str = "none";

/// Outcome of one top-level compression invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub success: bool,
    pub output: Option<Vec<u8>>,
    pub original_size_bytes: u64,
    pub final_size_bytes: u64,
    pub target_reached: bool,
    pub step_used: String,
    pub error_message: Option<String>,
}

impl CompressionResult {
    pub fn reached(output: Vec<u8>, original_size: u64, step: &str) -> Self {
        Self {
            success: true,
            final_size_bytes: output.len() as u64,
            output: Some(output),
            original_size_bytes: original_size,
            target_reached: true,
            step_used: step.to_string(),
            error_message: None,
        }
    }

    /// Search ran out of rungs; `output` is the best candidate seen.
    pub fn exhausted(output: Vec<u8>, original_size: u64, step: &str) -> Self {
        Self {
            target_reached: false,
            ..Self::reached(output, original_size, step)
        }
    }

    pub fn failed(original_size: u64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            original_size_bytes: original_size,
            final_size_bytes: 0,
            target_reached: false,
            step_used: STEP_NONE.to_string(),
            error_message: Some(message.into()),
        }
    }

    pub fn original_size_mb(&self) -> f64 {
        bytes_to_mb(self.original_size_bytes)
    }

    pub fn final_size_mb(&self) -> f64 {
        bytes_to_mb(self.final_size_bytes)
    }

    /// How many times smaller the output is.
    pub fn reduction_ratio(&self) -> f64 {
        if self.final_size_bytes == 0 {
            return 0.0;
        }
        self.original_size_bytes as f64 / self.final_size_bytes as f64
    }

    pub fn savings_percent(&self) -> f64 {
        if self.original_size_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.final_size_bytes as f64 / self.original_size_bytes as f64) * 100.0
    }

    /// Ran to the end without shrinking the file at all.
    pub fn made_no_reduction(&self) -> bool {
        self.success && !self.target_reached && self.final_size_bytes >= self.original_size_bytes
    }
}
