// ============================================================================
// mediapress-core/src/transcode/mod.rs
// ============================================================================
//
// TRANSCODING: Per-Task Processing
//
// A transcoder turns one task into one outcome. Both implementations follow
// the same output protocol: compute the mirrored destination, skip if it
// already exists, write to a private `.part` sibling, and rename on success.
//
// KEY COMPONENTS:
// - Transcoder: Trait implemented per task kind
// - TaskEnv: What a worker lends to the transcoder for one task
// - VideoTranscoder: External encoder with streamed progress
// - ImageTranscoder: In-process decode and re-encode

use crate::config::ProcessingContext;
use crate::error::CoreResult;
use crate::progress::TaskProgress;
use crate::shutdown::ShutdownController;
use crate::task::{Outcome, Task, WorkerFlavor};
use crate::utils::file_size;

use std::path::{Path, PathBuf};

pub mod events;
pub mod image;
pub mod video;

pub use self::image::ImageTranscoder;
pub use self::video::VideoTranscoder;

/// Borrowed run state for processing one task.
#[derive(Debug, Clone, Copy)]
pub struct TaskEnv<'a> {
    pub ctx: &'a ProcessingContext,
    pub shutdown: &'a ShutdownController,
    pub flavor: WorkerFlavor,
}

/// Processes one task to completion.
///
/// Per-task problems are reported as `Outcome::Failed`. `Err` is reserved for
/// conditions that must stop the whole run.
pub trait Transcoder: Send + Sync {
    fn process(
        &self,
        task: &Task,
        env: &TaskEnv<'_>,
        progress: &mut TaskProgress,
    ) -> CoreResult<Outcome>;
}

/// Destination path with its parent directories created.
///
/// Errors here are per-task failures, never fatal.
pub(crate) fn prepare_destination(task: &Task, ctx: &ProcessingContext) -> Result<PathBuf, Outcome> {
    let dest = ctx
        .destination_for(task)
        .map_err(|e| failed(e.to_string()))?;
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            failed(format!("Cannot create {}: {}", parent.display(), e))
        })?;
    }
    Ok(dest)
}

pub(crate) fn failed(error: impl Into<String>) -> Outcome {
    Outcome::Failed {
        error: error.into(),
        tail: Vec::new(),
    }
}

/// Removes the source after a successful encode.
fn remove_source(source: &Path) -> Result<(), String> {
    match std::fs::remove_file(source) {
        Ok(()) => {
            log::info!("Deleted source {}", source.display());
            Ok(())
        }
        Err(e) => {
            log::warn!("Failed to delete source {}: {}", source.display(), e);
            Err(e.to_string())
        }
    }
}

/// Outcome for a published output, deleting the source when requested. A
/// failed removal is recorded on the outcome and leaves the task completed.
pub(crate) fn completed(task: &Task, input_size: u64, dest: &Path, ctx: &ProcessingContext) -> Outcome {
    let output_size = file_size(dest);
    let (source_deleted, delete_error) = if ctx.delete_source {
        match remove_source(&task.source) {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e)),
        }
    } else {
        (false, None)
    };
    Outcome::Completed {
        input_size,
        output_size,
        source_deleted,
        delete_error,
    }
}
