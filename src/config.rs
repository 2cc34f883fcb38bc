use std::path::PathBuf;

use clap::ValueEnum;

use crate::cli::Args;
use crate::progress::CancellationToken;

pub const DEFAULT_TARGET_MB: f64 = 30.0;

/// Which strategy the orchestrator runs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Re-encode embedded images, keep text and vectors
    #[default]
    Preserve,
    /// Replace every page with a bitmap
    Rasterize,
    /// Preserve first, rasterize if that could not shrink the file
    Auto,
}

/// Which engine runs the text-preserving ladder.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    /// Ghostscript when installed, in-process otherwise
    #[default]
    Auto,
    InProcess,
    Ghostscript,
}

/// Runtime settings for one compression invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub target_mb: f64,
    pub mode: Mode,
    pub backend: BackendChoice,
    /// Overrides the PATH lookup for `gs`
    pub ghostscript_path: Option<PathBuf>,
    /// Run qpdf after Ghostscript when it is installed
    pub use_qpdf: bool,
    /// Transcode images of one rung on the rayon pool
    pub parallel: bool,
    pub cancel: Option<CancellationToken>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_mb: DEFAULT_TARGET_MB,
            mode: Mode::default(),
            backend: BackendChoice::default(),
            ghostscript_path: None,
            use_qpdf: true,
            parallel: true,
            cancel: None,
        }
    }
}

impl Settings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            target_mb: args.target_mb,
            mode: args.mode,
            backend: args.backend,
            ghostscript_path: args.gs_path.clone(),
            use_qpdf: !args.no_qpdf,
            ..Self::default()
        }
    }

    pub fn with_target_mb(mut self, target_mb: f64) -> Self {
        self.target_mb = target_mb;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_backend(mut self, backend: BackendChoice) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
