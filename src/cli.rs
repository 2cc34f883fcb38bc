use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{BackendChoice, Mode, DEFAULT_TARGET_MB};

/// Compress PDF files to a target size by downsampling images while
/// preserving text.
#[derive(Parser, Debug)]
#[command(name = "pdf-shrink")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// PDF file(s) to compress
    #[arg(required = true)]
    pub input: Vec<PathBuf>,

    /// Output path (single input only). Default: <input>.compressed.pdf
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Target file size in MB
    #[arg(short = 't', long, default_value_t = DEFAULT_TARGET_MB, value_parser = parse_target_mb)]
    pub target_mb: f64,

    /// Compression strategy
    #[arg(long, value_enum, default_value = "preserve")]
    pub mode: Mode,

    /// Engine for the text-preserving ladder
    #[arg(long, value_enum, default_value = "auto")]
    pub backend: BackendChoice,

    /// Path to the Ghostscript executable
    #[arg(long)]
    pub gs_path: Option<PathBuf>,

    /// Skip the qpdf pass after Ghostscript
    #[arg(long)]
    pub no_qpdf: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Where the result for `input` is written.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        match &self.output {
            Some(path) if self.input.len() == 1 => path.clone(),
            _ => default_output_path(input),
        }
    }
}

fn parse_target_mb(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("`{}` is not a number", s))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err("target size must be a positive number".to_string())
    }
}

/// `<stem>.compressed.pdf` next to the input, without doubling the suffix.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.strip_suffix(".compressed").unwrap_or(&stem);
    input.with_file_name(format!("{}.compressed.pdf", stem))
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} bytes", b),
    }
}
