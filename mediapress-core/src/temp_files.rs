//! In-progress output files.
//!
//! Every output is first written to a uniquely named sibling of its
//! destination, `.<name>.<random>.part`, and only published under its final
//! name once complete. [`PartialOutput`] owns that sibling: the file is
//! created exclusively when the task claims it, so two tasks can never write
//! to the same partial, and dropping it without a successful [`commit`]
//! removes only the file this task created.
//!
//! [`commit`]: PartialOutput::commit

use crate::config::PARTIAL_SUFFIX;
use crate::error::{CoreError, CoreResult};

use std::path::{Path, PathBuf};
use tempfile::{Builder as TempFileBuilder, NamedTempFile};

#[derive(Debug)]
pub struct PartialOutput {
    file: Option<NamedTempFile>,
    dest: PathBuf,
}

impl PartialOutput {
    /// Creates a fresh partial file next to `dest`.
    pub fn new(dest: &Path) -> CoreResult<Self> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = TempFileBuilder::new()
            .prefix(&format!(".{name}."))
            .suffix(&format!(".{PARTIAL_SUFFIX}"))
            .tempfile_in(dir)?;
        log::trace!("Claimed partial output {}", file.path().display());
        Ok(Self {
            file: Some(file),
            dest: dest.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file
            .as_ref()
            .map_or(self.dest.as_path(), NamedTempFile::path)
    }

    /// Publishes the partial file under its final name. An existing file at
    /// the destination is never replaced.
    pub fn commit(mut self) -> CoreResult<PathBuf> {
        let Some(file) = self.file.take() else {
            return Err(CoreError::PathError(format!(
                "Partial output for {} already released",
                self.dest.display()
            )));
        };
        if file.as_file().metadata()?.len() == 0 {
            return Err(CoreError::PathError(format!(
                "Encoder produced no output at {}",
                file.path().display()
            )));
        }
        file.persist_noclobber(&self.dest).map_err(|e| {
            CoreError::PathError(format!(
                "Cannot publish {}: {}",
                self.dest.display(),
                e.error
            ))
        })?;
        Ok(self.dest.clone())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let path = file.path().to_path_buf();
        match file.close() {
            Ok(()) => log::debug!("Removed partial output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove partial output {}: {}", path.display(), e),
        }
    }
}
