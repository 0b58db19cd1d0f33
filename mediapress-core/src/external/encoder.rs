// ============================================================================
// mediapress-core/src/external/encoder.rs
// ============================================================================
//
// ENCODER EXECUTION: FFmpeg Process Management and Abstraction
//
// This module defines how a video encode is launched and how the running
// process is observed and controlled.
//
// KEY COMPONENTS:
// - EncoderProcess: Trait representing a running encoder
// - EncoderSpawner: Trait for launching an encoder for one job
// - SidecarSpawner: Concrete implementation using ffmpeg-sidecar
// - build_encode_args: CPU (libx265) and GPU (hevc_nvenc) argument profiles
// - InvocationGate: Run-wide "first launch" marker
//
// A running encoder is observed through the ffmpeg-sidecar event stream:
// `Progress` events carry the elapsed output time, `Log` and `Error` events
// carry diagnostics. The process is placed in its own process group on Unix
// so a terminal Ctrl-C is delivered to mediapress only; stopping an encode is
// always done through `kill`.

use crate::config::QualityParams;
use crate::error::{CoreError, CoreResult, command_start_error, command_wait_error};
use crate::external::detach_process_group;
use crate::task::WorkerFlavor;

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

// --- Encoder Execution Abstraction ---

/// One encode request: source, partial output path and encoder profile.
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub flavor: WorkerFlavor,
    pub quality: &'a QualityParams,
}

/// Parsed encoder output, consumed on a reader thread.
pub type EncoderEvents = Box<dyn Iterator<Item = FfmpegEvent> + Send>;

/// Trait representing a running encoder process.
pub trait EncoderProcess: Send {
    /// OS process id, when the encoder is a real child process.
    fn id(&mut self) -> Option<u32>;

    /// Takes the event stream. Returns `None` after the first call.
    fn take_events(&mut self) -> CoreResult<Option<EncoderEvents>>;

    /// Terminates the process.
    fn kill(&mut self) -> CoreResult<()>;

    /// Waits for exit and returns the exit code (`None` if killed by a signal).
    fn wait(&mut self) -> CoreResult<Option<i32>>;
}

/// Trait representing something that can launch an encoder.
pub trait EncoderSpawner: Send + Sync {
    type Process: EncoderProcess;

    fn spawn(&self, job: &EncodeJob<'_>) -> CoreResult<Self::Process>;
}

// --- Concrete Implementation using ffmpeg-sidecar ---

/// Wrapper around `ffmpeg_sidecar::child::FfmpegChild` implementing `EncoderProcess`.
pub struct SidecarProcess {
    child: FfmpegChild,
    events_taken: bool,
}

impl EncoderProcess for SidecarProcess {
    fn id(&mut self) -> Option<u32> {
        Some(self.child.as_inner().id())
    }

    fn take_events(&mut self) -> CoreResult<Option<EncoderEvents>> {
        if self.events_taken {
            return Ok(None);
        }
        self.events_taken = true;
        let iterator = self.child.iter().map_err(|e| {
            log::error!("Failed to get ffmpeg event iterator: {}", e);
            CoreError::OperationFailed(format!("Cannot read encoder output: {e}"))
        })?;
        Ok(Some(Box::new(iterator)))
    }

    fn kill(&mut self) -> CoreResult<()> {
        self.child
            .kill()
            .map_err(|e| command_wait_error("ffmpeg (kill)", e))
    }

    fn wait(&mut self) -> CoreResult<Option<i32>> {
        self.child
            .wait()
            .map(|status| status.code())
            .map_err(|e| command_wait_error("ffmpeg", e))
    }
}

/// Concrete implementation of `EncoderSpawner` using `ffmpeg-sidecar`.
#[derive(Debug, Clone, Default)]
pub struct SidecarSpawner;

impl EncoderSpawner for SidecarSpawner {
    type Process = SidecarProcess;

    fn spawn(&self, job: &EncodeJob<'_>) -> CoreResult<Self::Process> {
        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner();
        cmd.overwrite();
        cmd.args(["-nostdin", "-stats"]);
        cmd.input(job.input.to_string_lossy().as_ref());
        cmd.args(build_encode_args(job.flavor, job.quality));
        cmd.output(job.output.to_string_lossy().as_ref());

        // Output goes to a file; nothing is read from stdout.
        cmd.as_inner_mut().stdout(Stdio::null());
        detach_process_group(cmd.as_inner_mut());

        log::debug!("Running encode command: {:?}", cmd.as_inner());

        cmd.spawn()
            .map(|child| SidecarProcess {
                child,
                events_taken: false,
            })
            .map_err(|e| command_start_error("ffmpeg", e))
    }
}

// --- Encoder Profiles ---

/// Maps an x265 preset name onto the nearest hevc_nvenc preset.
#[must_use]
pub fn nvenc_preset(preset: &str) -> &'static str {
    match preset {
        "ultrafast" | "superfast" | "veryfast" | "faster" | "fast" => "p1",
        "slow" | "slower" | "veryslow" | "placebo" => "p7",
        _ => "p4",
    }
}

/// Codec arguments placed between the input and the output path.
///
/// Audio is copied and the muxer is forced to mp4 since the partial output
/// path does not end in `.mp4`.
#[must_use]
pub fn build_encode_args(flavor: WorkerFlavor, quality: &QualityParams) -> Vec<String> {
    let crf = quality.crf.to_string();
    let mut args: Vec<String> = match flavor {
        WorkerFlavor::Gpu => vec![
            "-c:v".into(),
            "hevc_nvenc".into(),
            "-rc".into(),
            "vbr".into(),
            "-cq".into(),
            crf,
            "-preset".into(),
            nvenc_preset(&quality.preset).into(),
        ],
        WorkerFlavor::Cpu => vec![
            "-c:v".into(),
            "libx265".into(),
            "-crf".into(),
            crf,
            "-preset".into(),
            quality.preset.clone(),
        ],
    };
    args.extend(["-c:a", "copy", "-f", "mp4"].map(String::from));
    args
}

// --- First-Launch Tracking ---

/// Records whether any encoder launch has been attempted in this run.
///
/// A missing encoder binary is fatal only for the launch that claims the gate
/// first; later launch failures are treated like ordinary encode failures.
#[derive(Debug, Default)]
pub struct InvocationGate {
    attempted: AtomicBool,
}

impl InvocationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for exactly one caller per run.
    pub fn claim_first(&self) -> bool {
        !self.attempted.swap(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nvenc_preset_mapping() {
        assert_eq!(nvenc_preset("ultrafast"), "p1");
        assert_eq!(nvenc_preset("fast"), "p1");
        assert_eq!(nvenc_preset("medium"), "p4");
        assert_eq!(nvenc_preset("slow"), "p7");
        assert_eq!(nvenc_preset("placebo"), "p7");
    }

    #[test]
    fn test_cpu_args() {
        let q = QualityParams {
            crf: 28,
            preset: "slow".into(),
            image_quality: 90,
        };
        assert_eq!(
            build_encode_args(WorkerFlavor::Cpu, &q),
            vec!["-c:v", "libx265", "-crf", "28", "-preset", "slow", "-c:a", "copy", "-f", "mp4"]
        );
    }

    #[test]
    fn test_gpu_args() {
        let q = QualityParams::default();
        assert_eq!(
            build_encode_args(WorkerFlavor::Gpu, &q),
            vec![
                "-c:v", "hevc_nvenc", "-rc", "vbr", "-cq", "23", "-preset", "p4", "-c:a", "copy",
                "-f", "mp4"
            ]
        );
    }

    #[test]
    fn test_gate_claims_once() {
        let gate = InvocationGate::new();
        assert!(gate.claim_first());
        assert!(!gate.claim_first());
        assert!(!gate.claim_first());
    }
}
