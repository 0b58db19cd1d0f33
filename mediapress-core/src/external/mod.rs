// ============================================================================
// mediapress-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with External CLI Tools
//
// This module encapsulates every process mediapress launches: the ffmpeg
// encoder, the nvidia-smi VRAM query and the dependency check. The encoder is
// reached through traits so the scheduler can be driven by scripted processes
// in tests.
//
// KEY COMPONENTS:
// - EncoderSpawner / EncoderProcess: Encoder launch abstraction
// - SidecarSpawner: Concrete implementation using ffmpeg-sidecar
// - InvocationGate: Marks the first encoder launch of a run
// - check_dependency: Verifies that a tool can be executed
// - detach_process_group / kill_process_group: Keeps children out of the
//   terminal's Ctrl-C and stops them on a forced exit

use crate::error::{CoreError, CoreResult};

use std::io;
use std::process::{Command, Stdio};

// ============================================================================
// SUBMODULES
// ============================================================================

/// Encoder process traits and the ffmpeg-sidecar implementation
pub mod encoder;

/// GPU memory queries used for worker sizing
pub mod gpu;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use encoder::{
    EncodeJob, EncoderEvents, EncoderProcess, EncoderSpawner, InvocationGate, SidecarProcess,
    SidecarSpawner, build_encode_args, nvenc_preset,
};
pub use gpu::query_free_vram_mib;

// ============================================================================
// DEPENDENCY CHECKING
// ============================================================================

/// Checks that `cmd_name` can be started by running it with `-version`.
///
/// Returns `DependencyNotFound` when the binary is missing and `CommandStart`
/// when it exists but cannot be launched.
pub fn check_dependency(cmd_name: &str) -> CoreResult<()> {
    let result = Command::new(cmd_name)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {}", cmd_name);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("Dependency '{}' not found.", cmd_name);
            Err(CoreError::DependencyNotFound(cmd_name.to_string()))
        }
        Err(e) => {
            log::error!("Failed to start dependency check command '{}': {}", cmd_name, e);
            Err(CoreError::CommandStart(cmd_name.to_string(), e))
        }
    }
}

// ============================================================================
// PROCESS GROUPS
// ============================================================================

/// Starts the child in a process group of its own, so a terminal Ctrl-C is
/// delivered to mediapress only. The group id equals the child's pid.
pub fn detach_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

/// Sends SIGKILL to the process group led by `pid`.
#[cfg(unix)]
pub fn kill_process_group(pid: u32) -> CoreResult<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)
        .map_err(|_| CoreError::OperationFailed(format!("Invalid process id {pid}")))?;
    killpg(Pid::from_raw(pgid), Signal::SIGKILL)
        .map_err(|e| CoreError::OperationFailed(format!("kill process group {pid}: {e}")))
}

#[cfg(not(unix))]
pub fn kill_process_group(pid: u32) -> CoreResult<()> {
    Err(CoreError::OperationFailed(format!(
        "Cannot kill process group {pid} on this platform"
    )))
}
