// ============================================================================
// mediapress-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Custom Error Types for Mediapress Core
//
// This module defines the error type shared by every component of the
// scheduler. Per-task problems (encoder exit codes, unreadable images) are
// NOT errors at this level: they become `Outcome::Failed` on the task report.
// A `CoreError` either aborts a setup step or, for `DependencyNotFound`,
// halts the whole run.
//
// KEY COMPONENTS:
// - CoreError: Enum of all error categories
// - CoreResult: Type alias for Result with CoreError
// - Helper functions for creating command errors

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for all mediapress-core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("Failed to start command '{0}': {1}")]
    CommandStart(String, io::Error),

    #[error("Failed to wait for command '{0}': {1}")]
    CommandWait(String, io::Error),

    #[error("Required external command '{0}' not found. Please ensure it is installed and in your PATH.")]
    DependencyNotFound(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No media files found in {}", .0.display())]
    NoFilesFound(PathBuf),

    #[error("Worker thread '{0}' panicked")]
    WorkerPanicked(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for mediapress-core operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<image::ImageError> for CoreError {
    fn from(err: image::ImageError) -> Self {
        CoreError::Image(err.to_string())
    }
}

impl CoreError {
    /// True for errors that must stop the run instead of failing one task.
    #[must_use]
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, CoreError::DependencyNotFound(_))
    }
}

/// Creates a `CommandStart` error, mapping a missing binary to `DependencyNotFound`.
pub fn command_start_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    let cmd = cmd.into();
    if err.kind() == io::ErrorKind::NotFound {
        CoreError::DependencyNotFound(cmd)
    } else {
        CoreError::CommandStart(cmd, err)
    }
}

pub fn command_wait_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandWait(cmd.into(), err)
}
