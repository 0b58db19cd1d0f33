//! Task and outcome types.
//!
//! A [`Task`] is one file's unit of work. Its kind is resolved once from the
//! file extension when the task is built and is never re-inferred afterwards.
//! Every task ends in exactly one [`Outcome`], which is wrapped in a
//! [`TaskReport`] for the summary and the optional JSON report.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Video container extensions accepted by discovery (lowercase).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "flv", "wmv", "ts", "webm"];

/// Image extensions accepted by discovery (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Video,
    Image,
}

impl TaskKind {
    /// Resolves the kind from the file extension, case-insensitively.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(TaskKind::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(TaskKind::Image)
        } else {
            None
        }
    }
}

/// One file waiting to be processed. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub source: PathBuf,
    pub kind: TaskKind,
}

impl Task {
    /// Builds a task for `source`, or `None` if the extension is not supported.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>) -> Option<Self> {
        let source = source.into();
        let kind = TaskKind::from_path(&source)?;
        Some(Self { source, kind })
    }

    /// File name used in terminal output.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Encoder profile a worker uses for video tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerFlavor {
    Cpu,
    Gpu,
}

impl fmt::Display for WorkerFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerFlavor::Cpu => f.write_str("CPU"),
            WorkerFlavor::Gpu => f.write_str("GPU"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Something is already at the destination path.
    Exists,
    /// The video already uses one of the efficient codecs.
    AlreadyEfficient(String),
    /// An earlier task in the run writes the same destination; holds that
    /// task's source.
    SameDestination(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Exists => f.write_str("Output exists"),
            SkipReason::AlreadyEfficient(codec) => {
                write!(f, "Already {} encoded", codec.to_uppercase())
            }
            SkipReason::SameDestination(first) => {
                let name = first.file_name().map_or_else(
                    || first.display().to_string(),
                    |n| n.to_string_lossy().into_owned(),
                );
                write!(f, "Same output as {name}")
            }
        }
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed {
        input_size: u64,
        output_size: u64,
        source_deleted: bool,
        /// Why `--delete-source` could not remove the source.
        #[serde(skip_serializing_if = "Option::is_none")]
        delete_error: Option<String>,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
        tail: Vec<String>,
    },
    Aborted,
}

impl Outcome {
    #[must_use]
    pub fn skipped(reason: SkipReason) -> Self {
        Outcome::Skipped { reason }
    }

    /// Bytes saved by a completed task; zero for everything else or when the
    /// output grew.
    #[must_use]
    pub fn saved_bytes(&self) -> u64 {
        match self {
            Outcome::Completed {
                input_size,
                output_size,
                ..
            } => input_size.saturating_sub(*output_size),
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Outcome::Aborted)
    }
}

/// What happened to one task, and on which worker.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub source: PathBuf,
    pub kind: TaskKind,
    pub worker: String,
    /// `None` for tasks settled by the scheduler before reaching a worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<WorkerFlavor>,
    pub outcome: Outcome,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl TaskReport {
    #[must_use]
    pub fn display_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
