// ============================================================================
// mediapress-core/src/config.rs
// ============================================================================
//
// CONFIGURATION: Run Configuration and Defaults
//
// This module defines the per-run configuration shared read-only by every
// worker, together with the default values and timing constants used across
// the scheduler.
//
// KEY COMPONENTS:
// - ProcessingContext: Input/output roots, quality settings and flags
// - QualityParams: Encoder quality knobs for video and image tasks
// - Default constants and polling intervals
// - Output path resolution (destination per task, default output root)

use crate::error::{CoreError, CoreResult};
use crate::task::{Task, TaskKind};

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

// ============================================================================
// DEFAULT VALUES
// ============================================================================

/// Default CRF (libx265) / CQ (hevc_nvenc) value.
pub const DEFAULT_CRF: u8 = 23;

/// Default x265 preset name.
pub const DEFAULT_PRESET: &str = "medium";

/// Default lossy image quality (1-100).
pub const DEFAULT_IMAGE_QUALITY: u8 = 90;

/// Valid x265 preset names, fastest first.
pub const X265_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// Video codecs that are not worth re-encoding.
pub const EFFICIENT_CODECS: &[&str] = &["hevc", "h265", "av1"];

/// Above this many files the duration pre-scan needs confirmation.
pub const SCAN_CONFIRM_THRESHOLD: usize = 100;

/// How long a confirmed cancellation waits for workers before giving up.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Bounded wait for `TaskQueue::pop`.
pub const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Interval at which the transcode loop re-checks shutdown state.
pub const CHECKPOINT_INTERVAL: Duration = Duration::from_millis(100);

/// Number of encoder output lines kept for failure reports.
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Extension appended to in-progress outputs.
pub const PARTIAL_SUFFIX: &str = "part";

// ============================================================================
// QUALITY PARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityParams {
    /// CRF for libx265, reused as CQ for hevc_nvenc.
    pub crf: u8,
    /// x265 preset name; GPU workers map it onto p1/p4/p7.
    pub preset: String,
    /// Quality for WebP/JPEG output.
    pub image_quality: u8,
}

impl Default for QualityParams {
    fn default() -> Self {
        Self {
            crf: DEFAULT_CRF,
            preset: DEFAULT_PRESET.to_string(),
            image_quality: DEFAULT_IMAGE_QUALITY,
        }
    }
}

// ============================================================================
// PROCESSING CONTEXT
// ============================================================================

/// Absolute form of `path` with `..` folded and its longest existing prefix
/// canonicalized, so `out/../in` and a symlink to `in` both compare equal
/// to `in`.
fn resolve_existing_prefix(path: &Path) -> CoreResult<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    let mut tail = Vec::new();
    let mut current = normalized.as_path();
    loop {
        if let Ok(resolved) = current.canonicalize() {
            return Ok(tail.iter().rev().fold(resolved, |acc, part| acc.join(part)));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                current = parent;
            }
            _ => return Ok(normalized),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub quality: QualityParams,
    pub delete_source: bool,
    pub image_keep_format: bool,
}

impl ProcessingContext {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            quality: QualityParams::default(),
            delete_source: false,
            image_keep_format: false,
        }
    }

    /// Checks the quality knobs and the input/output relationship.
    pub fn validate(&self) -> CoreResult<()> {
        if self.quality.crf > 51 {
            return Err(CoreError::Config(format!(
                "CRF must be between 0 and 51, got {}",
                self.quality.crf
            )));
        }
        if !(1..=100).contains(&self.quality.image_quality) {
            return Err(CoreError::Config(format!(
                "Image quality must be between 1 and 100, got {}",
                self.quality.image_quality
            )));
        }
        if !X265_PRESETS.contains(&self.quality.preset.as_str()) {
            return Err(CoreError::Config(format!(
                "Unknown preset '{}'. Expected one of: {}",
                self.quality.preset,
                X265_PRESETS.join(", ")
            )));
        }
        let input = resolve_existing_prefix(&self.input_root)?;
        let output = resolve_existing_prefix(&self.output_root)?;
        if output == input {
            return Err(CoreError::Config(format!(
                "Output must differ from the input ({})",
                input.display()
            )));
        }
        if self.input_root.is_dir() && output.starts_with(&input) {
            return Err(CoreError::Config(format!(
                "Output directory {} must not be inside the input directory {}",
                output.display(),
                input.display()
            )));
        }
        Ok(())
    }

    /// Final output path for `task`, mirroring its position under `input_root`.
    ///
    /// A task whose source *is* the input root (single-file run) maps to
    /// `output_root` itself.
    pub fn destination_for(&self, task: &Task) -> CoreResult<PathBuf> {
        let relative = task.source.strip_prefix(&self.input_root).map_err(|_| {
            CoreError::PathError(format!(
                "{} is not inside {}",
                task.source.display(),
                self.input_root.display()
            ))
        })?;

        if relative.as_os_str().is_empty() {
            return Ok(self.output_root.clone());
        }

        let mirrored = self.output_root.join(relative);
        Ok(match task.kind {
            TaskKind::Video => mirrored.with_extension("mp4"),
            TaskKind::Image if self.image_keep_format => mirrored,
            TaskKind::Image => mirrored.with_extension("webp"),
        })
    }
}

/// Picks the output root when the user gave none, or adjusts a given one for
/// single-file input.
///
/// - directory input, no output: `<parent>/<name>_compressed`
/// - file input, no output: `<parent>/<stem>_x265.mp4` (video) or
///   `<parent>/<stem>_compressed.<ext>` (image)
/// - file input, output is a directory: `<output>/<stem>.<ext>`
pub fn resolve_output_root(
    input: &Path,
    output: Option<&Path>,
    image_keep_format: bool,
) -> CoreResult<PathBuf> {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let name = input
        .file_name()
        .ok_or_else(|| CoreError::PathError(format!("Invalid input path: {}", input.display())))?
        .to_string_lossy()
        .into_owned();

    if input.is_dir() {
        return Ok(match output {
            Some(out) => out.to_path_buf(),
            None => parent.join(format!("{name}_compressed")),
        });
    }

    let kind = TaskKind::from_path(input).ok_or_else(|| {
        CoreError::PathError(format!("Unsupported file type: {}", input.display()))
    })?;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(name);
    let ext = match kind {
        TaskKind::Video => "mp4".to_string(),
        TaskKind::Image if image_keep_format => input
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "webp".to_string()),
        TaskKind::Image => "webp".to_string(),
    };

    Ok(match output {
        Some(out) if out.is_dir() || out.as_os_str().to_string_lossy().ends_with(['/', '\\']) => {
            out.join(format!("{stem}.{ext}"))
        }
        Some(out) => out.to_path_buf(),
        None => match kind {
            TaskKind::Video => parent.join(format!("{stem}_x265.{ext}")),
            TaskKind::Image => parent.join(format!("{stem}_compressed.{ext}")),
        },
    })
}
