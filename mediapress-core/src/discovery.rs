//! Input file discovery.
//!
//! Walks the input directory recursively and keeps every file with a
//! supported video or image extension, in a stable (sorted) order.

use crate::error::{CoreError, CoreResult};
use crate::task::Task;

use std::path::Path;
use walkdir::WalkDir;

/// Tasks for every processable file under `input` (or `input` itself if it
/// is a supported file).
pub fn find_processable_files(input: &Path) -> CoreResult<Vec<Task>> {
    if input.is_file() {
        return match Task::new(input) {
            Some(task) => Ok(vec![task]),
            None => Err(CoreError::NoFilesFound(input.to_path_buf())),
        };
    }
    if !input.is_dir() {
        return Err(CoreError::PathError(format!(
            "Invalid input path: {}",
            input.display()
        )));
    }

    let mut tasks = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(task) = Task::new(entry.into_path()) {
            tasks.push(task);
        }
    }

    if tasks.is_empty() {
        return Err(CoreError::NoFilesFound(input.to_path_buf()));
    }
    log::debug!("Discovered {} processable files in {}", tasks.len(), input.display());
    Ok(tasks)
}
