//! Browser entry point.

use clap::ValueEnum;
use wasm_bindgen::prelude::*;

use crate::backend::Compressor;
use crate::config::{BackendChoice, Mode, Settings};
use crate::progress::{Progress, ProgressEvent};
use crate::result::CompressionResult;

#[wasm_bindgen]
pub struct WasmCompressionResult {
    inner: CompressionResult,
}

#[wasm_bindgen]
impl WasmCompressionResult {
    #[wasm_bindgen(getter)]
    pub fn success(&self) -> bool {
        self.inner.success
    }

    /// The compressed document, absent on failure.
    #[wasm_bindgen(getter)]
    pub fn output(&self) -> Option<Vec<u8>> {
        self.inner.output.clone()
    }

    #[wasm_bindgen(getter, js_name = originalSizeBytes)]
    pub fn original_size_bytes(&self) -> f64 {
        self.inner.original_size_bytes as f64
    }

    #[wasm_bindgen(getter, js_name = finalSizeBytes)]
    pub fn final_size_bytes(&self) -> f64 {
        self.inner.final_size_bytes as f64
    }

    #[wasm_bindgen(getter, js_name = originalSizeMb)]
    pub fn original_size_mb(&self) -> f64 {
        self.inner.original_size_mb()
    }

    #[wasm_bindgen(getter, js_name = finalSizeMb)]
    pub fn final_size_mb(&self) -> f64 {
        self.inner.final_size_mb()
    }

    #[wasm_bindgen(getter, js_name = savingsPercent)]
    pub fn savings_percent(&self) -> f64 {
        self.inner.savings_percent()
    }

    #[wasm_bindgen(getter, js_name = targetReached)]
    pub fn target_reached(&self) -> bool {
        self.inner.target_reached
    }

    #[wasm_bindgen(getter, js_name = stepUsed)]
    pub fn step_used(&self) -> String {
        self.inner.step_used.clone()
    }

    #[wasm_bindgen(getter, js_name = errorMessage)]
    pub fn error_message(&self) -> Option<String> {
        self.inner.error_message.clone()
    }
}

/// `"preserve"`, `"rasterize"` or `"auto"`, case-insensitive.
pub fn parse_mode(mode: &str) -> Option<Mode> {
    Mode::from_str(mode.trim(), true).ok()
}

/// Settings for the browser: no worker threads and no external processes.
pub fn browser_settings(target_mb: f64, mode: Mode) -> Settings {
    Settings::default()
        .with_target_mb(target_mb)
        .with_mode(mode)
        .with_backend(BackendChoice::InProcess)
        .with_parallel(false)
}

/// Compress `input` towards `target_mb`.
///
/// `on_progress` is called as `(message, sizeMb | undefined)` for every
/// progress event; events are also written to the console.
#[wasm_bindgen]
pub fn compress_pdf(
    input: &[u8],
    target_mb: f64,
    mode: &str,
    on_progress: Option<js_sys::Function>,
) -> Result<WasmCompressionResult, JsError> {
    let mode = parse_mode(mode).ok_or_else(|| JsError::new(&format!("Unknown mode: {}", mode)))?;

    let mut sink = |event: ProgressEvent| {
        web_sys::console::log_1(&JsValue::from_str(&event.message));
        if let Some(callback) = &on_progress {
            let size = event.size_mb.map(JsValue::from_f64).unwrap_or(JsValue::UNDEFINED);
            let message = JsValue::from_str(&event.message);
            if let Err(e) = callback.call2(&JsValue::NULL, &message, &size) {
                web_sys::console::warn_2(&JsValue::from_str("progress callback failed:"), &e);
            }
        }
    };
    let mut progress = Progress::new(&mut sink);
    let inner = Compressor::new(browser_settings(target_mb, mode)).compress(input, &mut progress);
    Ok(WasmCompressionResult { inner })
}
