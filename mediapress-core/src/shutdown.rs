//! Run-wide cancellation and pause state.
//!
//! One [`ShutdownController`] is shared (behind an `Arc`) by the scheduler and
//! every worker. Workers poll it at loop boundaries and inside the transcode
//! loop; nothing is ever interrupted preemptively. Cancellation always wins
//! over pause: `cancel` clears the pause flag and wakes every blocked waiter.
//!
//! The controller also keeps track of every live encoder process. Encoders
//! run in their own process group, so they do not die with mediapress; a
//! forced exit goes through [`ShutdownController::kill_children`] first.

use crate::external::kill_process_group;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct ShutdownController {
    cancelled: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    /// Live encoder process ids and the partial file each one writes.
    children: Mutex<HashMap<u32, PathBuf>>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn paused_guard(&self) -> MutexGuard<'_, bool> {
        self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        *self.paused_guard() = false;
        self.resumed.notify_all();
        log::debug!("Cancellation requested");
    }

    pub fn pause(&self) {
        if self.is_cancelled() {
            return;
        }
        *self.paused_guard() = true;
        log::debug!("Workers paused");
    }

    pub fn resume(&self) {
        *self.paused_guard() = false;
        self.resumed.notify_all();
        log::debug!("Workers resumed");
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused_guard()
    }

    /// Blocks while paused. Returns `true` if the run was cancelled meanwhile.
    pub fn wait_while_paused(&self) -> bool {
        let guard = self.paused_guard();
        let _guard = self
            .resumed
            .wait_while(guard, |paused| *paused && !self.is_cancelled())
            .unwrap_or_else(PoisonError::into_inner);
        self.is_cancelled()
    }

    fn children_guard(&self) -> MutexGuard<'_, HashMap<u32, PathBuf>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a running encoder. `partial` is removed if the encoder has to
    /// be killed on a forced exit.
    pub fn track_child(&self, pid: u32, partial: &Path) {
        self.children_guard().insert(pid, partial.to_path_buf());
    }

    /// Forgets an encoder that has been reaped.
    pub fn release_child(&self, pid: u32) {
        self.children_guard().remove(&pid);
    }

    /// Kills the process group of every tracked encoder and removes its
    /// partial output. Returns how many encoders were killed.
    pub fn kill_children(&self) -> usize {
        let children: Vec<(u32, PathBuf)> = self.children_guard().drain().collect();
        for (pid, partial) in &children {
            log::warn!("Killing encoder process group {}", pid);
            if let Err(e) = kill_process_group(*pid) {
                log::warn!("Failed to kill encoder {}: {}", pid, e);
            }
            match std::fs::remove_file(partial) {
                Ok(()) => log::debug!("Removed partial output {}", partial.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", partial.display(), e),
            }
        }
        children.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_initial_state() {
        let s = ShutdownController::new();
        assert!(!s.is_cancelled());
        assert!(!s.is_paused());
        assert!(!s.wait_while_paused());
    }

    #[test]
    fn test_resume_wakes_waiter() {
        let s = Arc::new(ShutdownController::new());
        s.pause();
        let waiter = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.wait_while_paused())
        };
        thread::sleep(Duration::from_millis(30));
        assert!(!waiter.is_finished());
        s.resume();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_cancel_releases_paused_workers() {
        let s = Arc::new(ShutdownController::new());
        s.pause();
        let waiter = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.wait_while_paused())
        };
        thread::sleep(Duration::from_millis(30));
        s.cancel();
        assert!(waiter.join().unwrap());
        assert!(!s.is_paused());
    }

    #[test]
    fn test_pause_ignored_after_cancel() {
        let s = ShutdownController::new();
        s.cancel();
        s.pause();
        assert!(!s.is_paused());
    }

    #[test]
    fn test_released_child_is_not_killed() {
        let s = ShutdownController::new();
        s.track_child(u32::MAX, Path::new("/nonexistent/a.part"));
        s.release_child(u32::MAX);
        assert_eq!(s.kill_children(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_children_stops_detached_group() {
        use std::os::unix::process::{CommandExt, ExitStatusExt};

        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join(".a.mp4.x.part");
        std::fs::write(&partial, b"half").unwrap();
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();

        let s = ShutdownController::new();
        s.track_child(child.id(), &partial);
        assert_eq!(s.kill_children(), 1);

        let status = child.wait().unwrap();
        assert!(status.signal().is_some());
        assert!(!partial.exists());
        assert_eq!(s.kill_children(), 0);
    }
}
