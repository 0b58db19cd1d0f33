//! Encoder event draining.
//!
//! The ffmpeg-sidecar iterator blocks on the encoder's stderr, so it runs on
//! a dedicated reader thread that forwards each event over a channel. The
//! thread keeps consuming events while the run is paused so the encoder
//! never blocks on a full pipe buffer; the worker just stops consuming the
//! channel until it resumes.

use crate::external::EncoderEvents;
use crate::utils::parse_ffmpeg_time;

use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct EventDrain {
    events: Receiver<FfmpegEvent>,
    reader: Option<JoinHandle<()>>,
}

impl EventDrain {
    pub fn start(source: EncoderEvents, name: &str) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name(format!("drain-{name}"))
            .spawn(move || {
                for event in source {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            events: rx,
            reader: Some(reader),
        })
    }

    /// Next event, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<FfmpegEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Waits for the event stream to end and returns every event not yet
    /// consumed.
    pub fn finish(mut self) -> Vec<FfmpegEvent> {
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                log::warn!("Encoder event reader panicked");
            }
        }
        self.events.try_iter().collect()
    }
}

/// What one encoder event means for the task.
#[derive(Debug, Clone, PartialEq)]
pub enum EventEffect {
    /// Seconds of output written so far.
    Progress(f64),
    /// A line worth keeping for the failure report.
    Diagnostic(String),
    Ignored,
}

/// Classifies an event. `time=N/A` and negative times carry no progress.
#[must_use]
pub fn classify(event: FfmpegEvent) -> EventEffect {
    match event {
        FfmpegEvent::Progress(progress) => parse_ffmpeg_time(&progress.time)
            .filter(|secs| *secs >= 0.0)
            .map_or(EventEffect::Ignored, EventEffect::Progress),
        FfmpegEvent::Log(LogLevel::Info, _) => EventEffect::Ignored,
        FfmpegEvent::Log(_, message) | FfmpegEvent::Error(message) => {
            EventEffect::Diagnostic(message)
        }
        _ => EventEffect::Ignored,
    }
}

/// Bounded tail of diagnostic lines kept for failure reports.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}
