// ============================================================================
// mediapress-core/src/transcode/video.rs
// ============================================================================
//
// VIDEO TRANSCODING: External Encoder With Streamed Progress
//
// Sequence for one video task:
// 1. Mirror the destination under the output root; skip if it exists.
// 2. Skip sources already in an efficient codec (hevc, h265, av1).
// 3. Launch the encoder writing to a private `.part` file.
// 4. Consume its events: each `Progress` event moves the task's progress;
//    warnings and errors go into a bounded diagnostic tail.
// 5. Exit code 0 publishes the partial file; anything else fails the task
//    and the partial file is removed.
//
// SHUTDOWN CHECKPOINTS:
// The read loop checks cancellation first and pause second on every
// iteration, and never blocks longer than the poll interval. Cancellation
// kills the encoder and removes the partial file. While paused the encoder
// keeps running and its events keep being drained by the reader thread;
// they are held in the channel and applied once the run resumes.

use crate::config::{CHECKPOINT_INTERVAL, DIAGNOSTIC_TAIL_LINES, EFFICIENT_CODECS};
use crate::error::CoreResult;
use crate::external::{EncodeJob, EncoderProcess, EncoderSpawner, InvocationGate};
use crate::probe::MediaProbe;
use crate::progress::TaskProgress;
use crate::shutdown::ShutdownController;
use crate::task::{Outcome, SkipReason, Task};
use crate::temp_files::PartialOutput;
use crate::utils::file_size;

use super::events::{DiagnosticTail, EventDrain, EventEffect, classify};
use super::{TaskEnv, Transcoder, completed, failed, prepare_destination};

use ffmpeg_sidecar::event::FfmpegEvent;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

pub struct VideoTranscoder<S: EncoderSpawner> {
    spawner: S,
    probe: Arc<dyn MediaProbe>,
    gate: Arc<InvocationGate>,
    poll_interval: Duration,
}

enum ReadEnd {
    Exited,
    Cancelled,
}

/// Keeps a live encoder in the run's child registry until it is reaped.
struct TrackedChild<'a> {
    shutdown: &'a ShutdownController,
    pid: Option<u32>,
}

impl Drop for TrackedChild<'_> {
    fn drop(&mut self) {
        if let Some(pid) = self.pid {
            self.shutdown.release_child(pid);
        }
    }
}

impl<S: EncoderSpawner> VideoTranscoder<S> {
    pub fn new(spawner: S, probe: Arc<dyn MediaProbe>, gate: Arc<InvocationGate>) -> Self {
        Self {
            spawner,
            probe,
            gate,
            poll_interval: CHECKPOINT_INTERVAL,
        }
    }

    fn efficient_codec(&self, task: &Task) -> Option<String> {
        let codec = self.probe.codec(&task.source)?;
        EFFICIENT_CODECS.contains(&codec.as_str()).then_some(codec)
    }

    /// Consumes encoder events until the stream ends or the run is cancelled.
    fn read_events(
        &self,
        drain: &EventDrain,
        env: &TaskEnv<'_>,
        progress: &mut TaskProgress,
        tail: &mut DiagnosticTail,
    ) -> ReadEnd {
        loop {
            if env.shutdown.is_cancelled() {
                return ReadEnd::Cancelled;
            }
            if env.shutdown.is_paused() {
                if env.shutdown.wait_while_paused() {
                    return ReadEnd::Cancelled;
                }
                continue;
            }
            match drain.recv_timeout(self.poll_interval) {
                Ok(event) => {
                    // Events that arrive once paused are held until resume.
                    if env.shutdown.wait_while_paused() {
                        return ReadEnd::Cancelled;
                    }
                    apply_event(event, progress, tail);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return ReadEnd::Exited,
            }
        }
    }
}

fn apply_event(event: FfmpegEvent, progress: &mut TaskProgress, tail: &mut DiagnosticTail) {
    match classify(event) {
        EventEffect::Progress(seconds) => progress.update(seconds),
        EventEffect::Diagnostic(line) => tail.push(line),
        EventEffect::Ignored => {}
    }
}

fn stop(process: &mut impl EncoderProcess, name: &str) {
    if let Err(e) = process.kill() {
        log::warn!("Failed to stop encoder for {}: {}", name, e);
    }
    if let Err(e) = process.wait() {
        log::warn!("Failed to reap encoder for {}: {}", name, e);
    }
}

impl<S: EncoderSpawner> Transcoder for VideoTranscoder<S> {
    fn process(
        &self,
        task: &Task,
        env: &TaskEnv<'_>,
        progress: &mut TaskProgress,
    ) -> CoreResult<Outcome> {
        let name = task.display_name();
        let dest = match prepare_destination(task, env.ctx) {
            Ok(dest) => dest,
            Err(outcome) => return Ok(outcome),
        };
        if dest.exists() {
            log::debug!("{} already exists, skipping {}", dest.display(), name);
            return Ok(Outcome::skipped(SkipReason::Exists));
        }
        if let Some(codec) = self.efficient_codec(task) {
            return Ok(Outcome::skipped(SkipReason::AlreadyEfficient(codec)));
        }
        if env.shutdown.is_cancelled() {
            return Ok(Outcome::Aborted);
        }

        progress.show();
        progress.set_prefix(env.flavor.to_string());

        let partial = match PartialOutput::new(&dest) {
            Ok(partial) => partial,
            Err(e) => return Ok(failed(e.to_string())),
        };

        let first_launch = self.gate.claim_first();
        let job = EncodeJob {
            input: &task.source,
            output: partial.path(),
            flavor: env.flavor,
            quality: &env.ctx.quality,
        };
        log::debug!("Encoding {} on a {} worker", name, env.flavor);
        let mut process = match self.spawner.spawn(&job) {
            Ok(process) => process,
            Err(e) if first_launch && e.is_fatal_for_run() => return Err(e),
            Err(e) => return Ok(failed(e.to_string())),
        };
        let pid = process.id();
        if let Some(pid) = pid {
            env.shutdown.track_child(pid, partial.path());
        }
        let _tracked = TrackedChild {
            shutdown: env.shutdown,
            pid,
        };

        let mut tail = DiagnosticTail::new(DIAGNOSTIC_TAIL_LINES);
        let drain = match process.take_events() {
            Ok(Some(events)) => match EventDrain::start(events, &name) {
                Ok(drain) => Some(drain),
                Err(e) => {
                    stop(&mut process, &name);
                    return Ok(failed(format!("Cannot read encoder output: {e}")));
                }
            },
            Ok(None) => None,
            Err(e) => {
                stop(&mut process, &name);
                return Ok(failed(e.to_string()));
            }
        };

        let end = match &drain {
            Some(drain) => self.read_events(drain, env, progress, &mut tail),
            None => ReadEnd::Exited,
        };

        if let ReadEnd::Cancelled = end {
            stop(&mut process, &name);
            if let Some(drain) = drain {
                drain.finish();
            }
            return Ok(Outcome::Aborted);
        }

        let exit = process.wait();
        if let Some(drain) = drain {
            for event in drain.finish() {
                apply_event(event, progress, &mut tail);
            }
        }
        if env.shutdown.is_cancelled() {
            return Ok(Outcome::Aborted);
        }

        match exit {
            Ok(Some(0)) => {}
            Ok(code) => {
                let error = match code {
                    Some(code) => format!("Exit code: {code}"),
                    None => "Terminated by signal".to_string(),
                };
                return Ok(Outcome::Failed {
                    error,
                    tail: tail.into_vec(),
                });
            }
            Err(e) => {
                return Ok(Outcome::Failed {
                    error: e.to_string(),
                    tail: tail.into_vec(),
                });
            }
        }

        let input_size = file_size(&task.source);
        let dest = match partial.commit() {
            Ok(dest) => dest,
            Err(e) => return Ok(failed(e.to_string())),
        };
        Ok(completed(task, input_size, &dest, env.ctx))
    }
}
