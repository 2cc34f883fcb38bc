//! Interchangeable engines behind one `CompressionResult` contract, and the
//! orchestrator that picks between them.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::config::{BackendChoice, Mode, Settings};
use crate::error::{Error, Result};
use crate::ladder::{
    CompressionStep, COMPRESSION_LADDER, GHOSTSCRIPT_BREAKPOINTS, IN_PROCESS_BREAKPOINTS,
    RASTER_LADDER,
};
use crate::progress::{CancellationToken, Progress};
use crate::raster::{default_renderer, PageRenderer, Rasterizer};
use crate::result::{CompressionResult, STEP_NONE};
use crate::rewrite::ImageRewriter;
use crate::search::{LadderSearch, RungRunner};

pub trait CompressionBackend {
    fn name(&self) -> &'static str;

    fn compress(
        &self,
        input: &[u8],
        target_mb: f64,
        progress: &mut Progress<'_>,
    ) -> CompressionResult;
}

/// The lopdf + image ladder; always available.
#[derive(Debug, Clone, Default)]
pub struct InProcessBackend {
    rewriter: ImageRewriter,
    cancel: Option<CancellationToken>,
}

impl InProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            rewriter: ImageRewriter::new()
                .parallel(settings.parallel)
                .with_cancellation(settings.cancel.clone()),
            cancel: settings.cancel.clone(),
        }
    }
}

impl CompressionBackend for InProcessBackend {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn compress(
        &self,
        input: &[u8],
        target_mb: f64,
        progress: &mut Progress<'_>,
    ) -> CompressionResult {
        LadderSearch::new(&COMPRESSION_LADDER, &IN_PROCESS_BREAKPOINTS)
            .with_cancellation(self.cancel.clone())
            .run(input, target_mb, &self.rewriter, progress)
    }
}

pub struct RasterBackend<'r> {
    renderer: &'r dyn PageRenderer,
    cancel: Option<CancellationToken>,
}

impl<'r> RasterBackend<'r> {
    pub fn new(renderer: &'r dyn PageRenderer) -> Self {
        Self {
            renderer,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }
}

impl CompressionBackend for RasterBackend<'_> {
    fn name(&self) -> &'static str {
        "rasterize"
    }

    fn compress(
        &self,
        input: &[u8],
        target_mb: f64,
        progress: &mut Progress<'_>,
    ) -> CompressionResult {
        let rasterizer = Rasterizer::new(self.renderer).with_cancellation(self.cancel.clone());
        LadderSearch::new(&RASTER_LADDER, &IN_PROCESS_BREAKPOINTS)
            .with_cancellation(self.cancel.clone())
            .run(input, target_mb, &rasterizer, progress)
    }
}

/// Ghostscript `pdfwrite`, optionally followed by qpdf.
#[derive(Debug, Clone)]
pub struct GhostscriptBackend {
    gs: PathBuf,
    qpdf: Option<PathBuf>,
    cancel: Option<CancellationToken>,
}

impl GhostscriptBackend {
    pub fn new(gs: PathBuf, qpdf: Option<PathBuf>) -> Self {
        Self {
            gs,
            qpdf,
            cancel: None,
        }
    }

    /// `None` when no Ghostscript executable can be found.
    pub fn locate(settings: &Settings) -> Option<Self> {
        let gs = match &settings.ghostscript_path {
            Some(path) => path.is_file().then(|| path.clone())?,
            None => find_ghostscript()?,
        };
        let qpdf = if settings.use_qpdf { find_qpdf() } else { None };
        Some(Self {
            gs,
            qpdf,
            cancel: settings.cancel.clone(),
        })
    }
}

impl CompressionBackend for GhostscriptBackend {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    fn compress(
        &self,
        input: &[u8],
        target_mb: f64,
        progress: &mut Progress<'_>,
    ) -> CompressionResult {
        progress.message(format!("Using Ghostscript: {}", self.gs.display()));
        if let Some(qpdf) = &self.qpdf {
            progress.message(format!("Using qpdf: {}", qpdf.display()));
        }

        let runner = match GhostscriptRunner::prepare(self, input) {
            Ok(runner) => runner,
            Err(e) => return CompressionResult::failed(input.len() as u64, e.to_string()),
        };
        LadderSearch::new(&COMPRESSION_LADDER, &GHOSTSCRIPT_BREAKPOINTS)
            .with_cancellation(self.cancel.clone())
            .run(input, target_mb, &runner, progress)
    }
}

/// Owns the scratch directory for one invocation; the input is written once.
struct GhostscriptRunner<'b> {
    backend: &'b GhostscriptBackend,
    dir: tempfile::TempDir,
    input_path: PathBuf,
}

impl<'b> GhostscriptRunner<'b> {
    fn prepare(backend: &'b GhostscriptBackend, input: &[u8]) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("pdfshrink_").tempdir()?;
        let input_path = dir.path().join("input.pdf");
        std::fs::write(&input_path, input)?;
        Ok(Self {
            backend,
            dir,
            input_path,
        })
    }
}

impl RungRunner<CompressionStep> for GhostscriptRunner<'_> {
    fn validate(&self, input: &[u8]) -> Result<()> {
        let head = &input[..input.len().min(1024)];
        if head.windows(5).any(|w| w == b"%PDF-") {
            Ok(())
        } else {
            Err(Error::Parse("missing %PDF header".to_string()))
        }
    }

    fn run(
        &self,
        _input: &[u8],
        step: &CompressionStep,
        _progress: &mut Progress<'_>,
    ) -> Result<Vec<u8>> {
        let output_path = self.dir.path().join(format!("compressed_{}.pdf", step.name));
        let output = command(&self.backend.gs)
            .args(ghostscript_args(step.dpi, &self.input_path, &output_path))
            .output()?;
        if !output.status.success() || !output_path.exists() {
            return Err(Error::Backend(format!("Ghostscript failed: {}", stderr(&output))));
        }

        if let Some(qpdf) = &self.backend.qpdf {
            let optimized = output_path.with_extension("qpdf.pdf");
            let result = command(qpdf)
                .args(["--compress-streams=y", "--recompress-flate", "--object-streams=generate"])
                .arg(&output_path)
                .arg(&optimized)
                .output()?;
            // qpdf exit code 3 means "succeeded with warnings"
            let ok = result.status.success() || result.status.code() == Some(3);
            if ok && optimized.exists() {
                return Ok(std::fs::read(&optimized)?);
            }
            log::warn!("qpdf pass skipped: {}", stderr(&result));
        }
        Ok(std::fs::read(&output_path)?)
    }
}

pub fn ghostscript_args(dpi: u32, input: &Path, output: &Path) -> Vec<String> {
    let mono_dpi = dpi.max(150);
    vec![
        "-sDEVICE=pdfwrite".to_string(),
        "-dNOPAUSE".to_string(),
        "-dBATCH".to_string(),
        "-dSAFER".to_string(),
        "-dQUIET".to_string(),
        "-dCompatibilityLevel=1.5".to_string(),
        "-dDetectDuplicateImages=true".to_string(),
        "-dSubsetFonts=true".to_string(),
        "-dCompressFonts=true".to_string(),
        "-dEmbedAllFonts=true".to_string(),
        "-dDownsampleColorImages=true".to_string(),
        format!("-dColorImageResolution={}", dpi),
        "-dColorImageDownsampleType=/Bicubic".to_string(),
        "-dColorImageDownsampleThreshold=1.0".to_string(),
        "-dAutoFilterColorImages=false".to_string(),
        "-dColorImageFilter=/DCTEncode".to_string(),
        "-dDownsampleGrayImages=true".to_string(),
        format!("-dGrayImageResolution={}", dpi),
        "-dGrayImageDownsampleType=/Bicubic".to_string(),
        "-dGrayImageDownsampleThreshold=1.0".to_string(),
        "-dAutoFilterGrayImages=false".to_string(),
        "-dGrayImageFilter=/DCTEncode".to_string(),
        "-dDownsampleMonoImages=true".to_string(),
        format!("-dMonoImageResolution={}", mono_dpi),
        "-dMonoImageDownsampleType=/Subsample".to_string(),
        format!("-sOutputFile={}", output.display()),
        input.display().to_string(),
    ]
}

fn command(program: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null());
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// First match for any of `names` on PATH.
fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// `<root>/<any version dir>/bin/<exe>`, the layout of Windows installers.
#[cfg_attr(not(windows), allow(dead_code))]
fn find_in_install_dirs(roots: &[PathBuf], dir_prefix: &str, exe: &str) -> Option<PathBuf> {
    roots
        .iter()
        .filter_map(|root| std::fs::read_dir(root).ok())
        .flat_map(|entries| entries.flatten())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(dir_prefix))
        .map(|entry| entry.path().join("bin").join(exe))
        .find(|candidate| candidate.is_file())
}

#[cfg(windows)]
fn windows_roots(sub: &str) -> Vec<PathBuf> {
    let mut roots = vec![
        PathBuf::from("C:/Program Files").join(sub),
        PathBuf::from("C:/Program Files (x86)").join(sub),
    ];
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        roots.push(PathBuf::from(local).join("Programs").join(sub));
    }
    roots
}

pub fn find_ghostscript() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        find_on_path(&["gswin64c.exe", "gswin32c.exe"])
            .or_else(|| find_in_install_dirs(&windows_roots("gs"), "", "gswin64c.exe"))
            .or_else(|| find_in_install_dirs(&windows_roots("gs"), "", "gswin32c.exe"))
    }
    #[cfg(not(windows))]
    {
        find_on_path(&["gs"])
    }
}

pub fn find_qpdf() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        find_on_path(&["qpdf.exe"])
            .or_else(|| find_in_install_dirs(&windows_roots(""), "qpdf", "qpdf.exe"))
    }
    #[cfg(not(windows))]
    {
        find_on_path(&["qpdf"])
    }
}

/// Runs the configured strategy and backend for one document.
pub struct Compressor {
    settings: Settings,
    renderer: Option<Box<dyn PageRenderer>>,
}

impl Compressor {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            renderer: None,
        }
    }

    /// Use this renderer instead of the one compiled into the build.
    pub fn with_renderer(mut self, renderer: Box<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn compress(&self, input: &[u8], progress: &mut Progress<'_>) -> CompressionResult {
        match self.settings.mode {
            Mode::Preserve => self.preserve(input, progress),
            Mode::Rasterize => self.rasterize(input, progress),
            Mode::Auto => {
                let preserved = self.preserve(input, progress);
                if !preserved.made_no_reduction() {
                    return preserved;
                }
                progress.message(
                    "Text-preserving compression could not shrink the file; rasterizing pages",
                );
                let rasterized = self.rasterize(input, progress);
                if rasterized.success && rasterized.final_size_bytes < preserved.final_size_bytes {
                    rasterized
                } else {
                    preserved
                }
            }
        }
    }

    fn preserve(&self, input: &[u8], progress: &mut Progress<'_>) -> CompressionResult {
        let target_mb = self.settings.target_mb;
        let in_process = InProcessBackend::from_settings(&self.settings);
        match self.settings.backend {
            BackendChoice::InProcess => in_process.compress(input, target_mb, progress),
            BackendChoice::Ghostscript => match GhostscriptBackend::locate(&self.settings) {
                Some(gs) => gs.compress(input, target_mb, progress),
                None => CompressionResult::failed(input.len() as u64, "Ghostscript not found"),
            },
            BackendChoice::Auto => {
                let Some(gs) = GhostscriptBackend::locate(&self.settings) else {
                    progress.message("Ghostscript not found - using the built-in compressor");
                    return in_process.compress(input, target_mb, progress);
                };
                let result = gs.compress(input, target_mb, progress);
                let cancelled =
                    result.error_message.as_deref() == Some(Error::Cancelled.to_string().as_str());
                // Exhausted with no candidate means every Ghostscript rung failed
                let produced = result.target_reached || result.step_used != STEP_NONE;
                if cancelled || (result.success && produced) {
                    return result;
                }
                progress.message(format!(
                    "Ghostscript backend produced nothing ({}); using the built-in compressor",
                    result.error_message.as_deref().unwrap_or("every step failed")
                ));
                let fallback = in_process.compress(input, target_mb, progress);
                let smaller = fallback.final_size_bytes < result.final_size_bytes;
                if fallback.success && (!result.success || smaller) {
                    fallback
                } else {
                    result
                }
            }
        }
    }

    fn rasterize(&self, input: &[u8], progress: &mut Progress<'_>) -> CompressionResult {
        let fallback;
        let renderer: &dyn PageRenderer = match &self.renderer {
            Some(renderer) => renderer.as_ref(),
            None => match default_renderer() {
                Ok(renderer) => {
                    fallback = renderer;
                    fallback.as_ref()
                }
                Err(e) => {
                    progress.message(e.to_string());
                    return CompressionResult::failed(input.len() as u64, e.to_string());
                }
            },
        };
        progress.message("Rasterizing pages: text and vector content will become images");
        RasterBackend::new(renderer)
            .with_cancellation(self.settings.cancel.clone())
            .compress(input, self.settings.target_mb, progress)
    }
}
