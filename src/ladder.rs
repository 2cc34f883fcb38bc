//! Compression ladders and start-rung estimation.
//!
//! A ladder is searched front to back; every rung is at least as aggressive
//! as the one before it (resolution and quality never increase).

/// One rung of the text-preserving ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionStep {
    pub name: &'static str,
    /// Longest allowed image side in pixels
    pub max_dimension: u32,
    /// JPEG quality in (0, 1]
    pub quality: f32,
    /// Image resolution handed to Ghostscript for the same rung
    pub dpi: u32,
}

/// One rung of the rasterize ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStep {
    pub name: &'static str,
    /// Render scale factor (1.0 = 72 dpi)
    pub scale: f32,
    pub quality: f32,
}

pub const COMPRESSION_LADDER: [CompressionStep; 6] = [
    CompressionStep {
        name: "light",
        max_dimension: 2000,
        quality: 0.85,
        dpi: 200,
    },
    CompressionStep {
        name: "moderate",
        max_dimension: 1600,
        quality: 0.75,
        dpi: 175,
    },
    CompressionStep {
        name: "standard",
        max_dimension: 1200,
        quality: 0.65,
        dpi: 150,
    },
    CompressionStep {
        name: "aggressive",
        max_dimension: 1000,
        quality: 0.55,
        dpi: 125,
    },
    CompressionStep {
        name: "heavy",
        max_dimension: 800,
        quality: 0.45,
        dpi: 110,
    },
    CompressionStep {
        name: "extreme",
        max_dimension: 600,
        quality: 0.35,
        dpi: 100,
    },
];

pub const RASTER_LADDER: [RasterStep; 6] = [
    RasterStep {
        name: "high",
        scale: 2.0,
        quality: 0.85,
    },
    RasterStep {
        name: "medium",
        scale: 1.5,
        quality: 0.75,
    },
    RasterStep {
        name: "standard",
        scale: 1.25,
        quality: 0.65,
    },
    RasterStep {
        name: "low",
        scale: 1.0,
        quality: 0.55,
    },
    RasterStep {
        name: "very-low",
        scale: 0.75,
        quality: 0.45,
    },
    RasterStep {
        name: "minimum",
        scale: 0.5,
        quality: 0.35,
    },
];

/// Ratio breakpoints for the in-process rewriter. `ratio < table[i]` starts at
/// rung `i`.
pub const IN_PROCESS_BREAKPOINTS: [f64; 5] = [1.5, 2.0, 3.0, 4.0, 5.0];

/// Ghostscript shrinks more per rung, so it starts gentler.
pub const GHOSTSCRIPT_BREAKPOINTS: [f64; 5] = [3.0, 5.0, 8.0, 12.0, 20.0];

/// Common view over both kinds of rung, used by the search driver.
pub trait Rung: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolution knob: pixel cap or render scale.
    fn resolution(&self) -> f32;

    fn quality(&self) -> f32;

    /// Human readable parameters for progress messages.
    fn describe(&self) -> String;
}

impl Rung for CompressionStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn resolution(&self) -> f32 {
        self.max_dimension as f32
    }

    fn quality(&self) -> f32 {
        self.quality
    }

    fn describe(&self) -> String {
        format!("max {}px, quality {}", self.max_dimension, jpeg_quality(self.quality))
    }
}

impl Rung for RasterStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn resolution(&self) -> f32 {
        self.scale
    }

    fn quality(&self) -> f32 {
        self.quality
    }

    fn describe(&self) -> String {
        format!("scale {:.2}x, quality {}", self.scale, jpeg_quality(self.quality))
    }
}

/// True when no rung is gentler than the one before it.
pub fn is_monotonic<R: Rung>(ladder: &[R]) -> bool {
    ladder
        .windows(2)
        .all(|w| w[0].resolution() >= w[1].resolution() && w[0].quality() >= w[1].quality())
}

/// Pick the rung to start from for a given size ratio.
///
/// The breakpoints are a product decision, not a formula: a ratio exactly on
/// a breakpoint falls into the next rung because every comparison is strict.
pub fn estimate_start(original: u64, target: u64, breakpoints: &[f64], ladder_len: usize) -> usize {
    let last = ladder_len.saturating_sub(1);
    if target >= original {
        return 0;
    }
    if target == 0 {
        return last;
    }
    let ratio = original as f64 / target as f64;
    breakpoints
        .iter()
        .position(|&bp| ratio < bp)
        .unwrap_or(last)
        .min(last)
}

/// Map a (0, 1] quality factor onto the 1..=100 scale JPEG encoders take.
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}
