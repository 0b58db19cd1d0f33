// ============================================================================
// mediapress-core/src/worker.rs
// ============================================================================
//
// WORKER LOOP: Pull, Process, Report
//
// Every worker thread runs the same loop against the shared queue:
//   cancelled -> exit
//   paused    -> block until resumed (or cancelled)
//   pop       -> empty and nothing left -> exit
//             -> otherwise process the task and report its outcome
//
// A task's progress handle is created when it is dequeued and destroyed
// when its outcome is known. Every outcome except Aborted reconciles the
// aggregate to the task's full budget.

use crate::config::ProcessingContext;
use crate::error::CoreResult;
use crate::probe::{DurationTable, MediaProbe};
use crate::progress::{ProgressMode, ProgressTracker};
use crate::queue::TaskQueue;
use crate::shutdown::ShutdownController;
use crate::task::{Outcome, Task, TaskKind, TaskReport, WorkerFlavor};
use crate::transcode::{TaskEnv, Transcoder};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// State shared by every worker of one run.
pub struct WorkerShared {
    pub ctx: ProcessingContext,
    pub queue: TaskQueue,
    pub shutdown: Arc<ShutdownController>,
    pub tracker: Arc<ProgressTracker>,
    pub probe: Arc<dyn MediaProbe>,
    pub durations: DurationTable,
    pub video: Box<dyn Transcoder>,
    pub image: Box<dyn Transcoder>,
    pub queue_poll: Duration,
    reports: Mutex<Vec<TaskReport>>,
}

impl WorkerShared {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: ProcessingContext,
        queue: TaskQueue,
        shutdown: Arc<ShutdownController>,
        tracker: Arc<ProgressTracker>,
        probe: Arc<dyn MediaProbe>,
        durations: DurationTable,
        video: Box<dyn Transcoder>,
        image: Box<dyn Transcoder>,
        queue_poll: Duration,
    ) -> Self {
        Self {
            ctx,
            queue,
            shutdown,
            tracker,
            probe,
            durations,
            video,
            image,
            queue_poll,
            reports: Mutex::new(Vec::new()),
        }
    }

    fn transcoder(&self, kind: TaskKind) -> &dyn Transcoder {
        match kind {
            TaskKind::Video => self.video.as_ref(),
            TaskKind::Image => self.image.as_ref(),
        }
    }

    /// Duration shown on the task's bar. Time mode reuses the pre-scan so a
    /// task's budget matches what was summed into the total.
    fn duration_for(&self, task: &Task) -> Option<f64> {
        match (task.kind, self.tracker.mode()) {
            (TaskKind::Image, _) => None,
            (TaskKind::Video, ProgressMode::Time { .. }) => self.durations.get(&task.source),
            (TaskKind::Video, ProgressMode::Count { .. }) => self.probe.duration(&task.source),
        }
    }

    pub(crate) fn record(&self, report: TaskReport) {
        self.tracker.report(&report);
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }

    /// Copy of every report recorded so far.
    #[must_use]
    pub fn reports(&self) -> Vec<TaskReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Runs one worker until the queue is drained or the run is cancelled.
///
/// Returns `Err` only for run-fatal errors, after cancelling the run.
pub fn run_worker(name: &str, flavor: WorkerFlavor, shared: &WorkerShared) -> CoreResult<()> {
    log::debug!("Worker {} started", name);
    let shutdown = shared.shutdown.as_ref();
    let env = TaskEnv {
        ctx: &shared.ctx,
        shutdown,
        flavor,
    };

    loop {
        if shutdown.is_cancelled() {
            break;
        }
        if shutdown.is_paused() {
            if shutdown.wait_while_paused() {
                break;
            }
            continue;
        }

        let Some(task) = shared.queue.pop(shared.queue_poll) else {
            if shared.queue.is_empty() {
                break;
            }
            continue;
        };

        // A pause or cancel may have landed while waiting on the queue.
        if shutdown.wait_while_paused() {
            log::debug!("Worker {} dropping {} after cancellation", name, task.display_name());
            break;
        }

        let started = Instant::now();
        let mut progress = shared
            .tracker
            .new_task(task.display_name(), shared.duration_for(&task));

        let outcome = match shared.transcoder(task.kind).process(&task, &env, &mut progress) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Worker {} hit a fatal error on {}: {}", name, task.display_name(), e);
                shared.tracker.abort_task(progress);
                shutdown.cancel();
                shared.record(TaskReport {
                    source: task.source,
                    kind: task.kind,
                    worker: name.to_string(),
                    flavor: Some(flavor),
                    outcome: Outcome::Failed {
                        error: e.to_string(),
                        tail: Vec::new(),
                    },
                    elapsed: started.elapsed(),
                });
                return Err(e);
            }
        };

        if outcome.is_aborted() {
            shared.tracker.abort_task(progress);
        } else {
            shared.tracker.complete_task(progress);
        }

        shared.record(TaskReport {
            source: task.source,
            kind: task.kind,
            worker: name.to_string(),
            flavor: Some(flavor),
            outcome,
            elapsed: started.elapsed(),
        });
    }

    log::debug!("Worker {} exiting", name);
    Ok(())
}
