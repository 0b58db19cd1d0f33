// ============================================================================
// mediapress-core/src/scheduler.rs
// ============================================================================
//
// SCHEDULER: Run Driver and Interactive Cancellation
//
// The scheduler decides the progress mode, fills the queue, starts the
// worker pool and then monitors it until every worker has exited.
//
// STATE MACHINE:
//   Idle -> Cancelled            (interrupt confirmed during the duration scan)
//   Idle -> Running -> Completed
//   Running -> Draining          (interrupt received, workers paused)
//   Draining -> Paused -> Running   (operator declined to stop)
//   Draining -> Cancelled           (operator confirmed)
//   Running -> Cancelled            (fatal error in a worker)
// Completed and Cancelled are terminal.
//
// Workers are paused before the confirmation prompt is shown, so the
// operator answers against a frozen run. A confirmed stop cancels the run,
// which also releases paused workers, and waits a bounded grace period for
// workers to abort their encoders and exit. Encoders still alive after that
// are killed along with their partial outputs.
//
// Planning also settles tasks whose destination an earlier task already
// claims: they are reported as skipped and never reach a worker.

use crate::config::{
    DEFAULT_GRACE_PERIOD, ProcessingContext, QUEUE_POLL_INTERVAL, SCAN_CONFIRM_THRESHOLD,
};
use crate::error::{CoreError, CoreResult};
use crate::external::{EncoderSpawner, InvocationGate};
use crate::pool::WorkerPool;
use crate::probe::{DurationTable, MediaProbe};
use crate::progress::{ProgressMode, ProgressTracker};
use crate::queue::TaskQueue;
use crate::shutdown::ShutdownController;
use crate::sizing::WorkerCounts;
use crate::task::{Outcome, SkipReason, Task, TaskKind, TaskReport};
use crate::transcode::{ImageTranscoder, VideoTranscoder};
use crate::worker::WorkerShared;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Prompt shown on the first interrupt.
pub const STOP_PROMPT: &str = "Are you sure you want to stop processing?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Draining,
    Paused,
    Cancelled,
    Completed,
}

impl SchedulerState {
    #[must_use]
    pub fn can_transition_to(self, next: SchedulerState) -> bool {
        use SchedulerState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Cancelled)
                | (Running, Draining)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Draining, Paused)
                | (Draining, Cancelled)
                | (Paused, Running)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SchedulerState::Cancelled | SchedulerState::Completed)
    }
}

/// Yes/no questions put to the operator.
pub trait Confirm {
    fn confirm(&self, prompt: &str, default: bool) -> bool;
}

/// Whether to pre-scan durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Count mode, no probing up front.
    Skip,
    /// Scan, asking first when there are many files.
    Auto,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub counts: WorkerCounts,
    pub grace_period: Duration,
    pub queue_poll: Duration,
    pub monitor_interval: Duration,
    /// Draw progress bars on stderr.
    pub show_progress: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            counts: WorkerCounts { cpu: 1, gpu: 0 },
            grace_period: DEFAULT_GRACE_PERIOD,
            queue_poll: QUEUE_POLL_INTERVAL,
            monitor_interval: Duration::from_millis(200),
            show_progress: true,
        }
    }
}

/// Tasks plus the progress mode chosen for them.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub tasks: Vec<Task>,
    /// Tasks whose destination an earlier task claims, with that task's
    /// source. They are reported as skipped without being processed.
    pub duplicates: Vec<(Task, PathBuf)>,
    pub mode: ProgressMode,
    pub durations: DurationTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Completed,
    /// `forced` is set when workers were still running after the grace period.
    Cancelled { forced: bool },
}

#[derive(Debug)]
pub struct RunOutcome {
    pub end: RunEnd,
    pub reports: Vec<TaskReport>,
    pub total_tasks: usize,
    pub final_aggregate: f64,
    pub elapsed: Duration,
}

pub struct Scheduler<S: EncoderSpawner + 'static> {
    ctx: ProcessingContext,
    spawner: Option<S>,
    probe: Arc<dyn MediaProbe>,
    shutdown: Arc<ShutdownController>,
    config: SchedulerConfig,
    state: SchedulerState,
    display: MultiProgress,
}

impl<S: EncoderSpawner + 'static> Scheduler<S> {
    pub fn new(
        ctx: ProcessingContext,
        spawner: S,
        probe: Arc<dyn MediaProbe>,
        config: SchedulerConfig,
    ) -> Self {
        let display = if config.show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self {
            ctx,
            spawner: Some(spawner),
            probe,
            shutdown: Arc::new(ShutdownController::new()),
            config,
            state: SchedulerState::Idle,
            display,
        }
    }

    /// Draws the scan spinner and progress bars on `display`. Share it with
    /// anything else writing to the terminal so that output goes above the
    /// bars.
    #[must_use]
    pub fn with_display(mut self, display: MultiProgress) -> Self {
        if self.config.show_progress {
            self.display = display;
        }
        self
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub fn shutdown(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state.can_transition_to(next) {
            log::debug!("Scheduler {:?} -> {:?}", self.state, next);
            self.state = next;
        } else {
            log::warn!("Ignoring scheduler transition {:?} -> {:?}", self.state, next);
        }
    }

    /// Splits off tasks whose destination is already claimed by an earlier
    /// task in the list, e.g. `a.mkv` and `a.mp4` both mapping to `a.mp4`.
    fn split_duplicates(&self, tasks: Vec<Task>) -> (Vec<Task>, Vec<(Task, PathBuf)>) {
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut unique = Vec::with_capacity(tasks.len());
        let mut duplicates = Vec::new();
        for task in tasks {
            let Ok(dest) = self.ctx.destination_for(&task) else {
                unique.push(task);
                continue;
            };
            match claimed.get(&dest) {
                Some(first) => {
                    log::warn!(
                        "{} and {} both map to {}, keeping the first",
                        first.display(),
                        task.source.display(),
                        dest.display()
                    );
                    duplicates.push((task, first.clone()));
                }
                None => {
                    claimed.insert(dest, task.source.clone());
                    unique.push(task);
                }
            }
        }
        (unique, duplicates)
    }

    /// Chooses the progress mode, pre-scanning durations when appropriate.
    ///
    /// Interrupts received during the scan ask whether to stop; a confirmed
    /// stop cancels the run before any worker starts.
    pub fn plan(
        &mut self,
        tasks: Vec<Task>,
        policy: ScanPolicy,
        interrupts: &Receiver<()>,
        confirm: &dyn Confirm,
    ) -> RunPlan {
        let (tasks, duplicates) = self.split_duplicates(tasks);
        let count_plan = |tasks: Vec<Task>, duplicates: Vec<(Task, PathBuf)>| RunPlan {
            mode: ProgressMode::Count {
                total_tasks: tasks.len(),
            },
            tasks,
            duplicates,
            durations: DurationTable::default(),
        };

        if policy == ScanPolicy::Skip || !tasks.iter().any(|t| t.kind == TaskKind::Video) {
            return count_plan(tasks, duplicates);
        }
        if tasks.len() > SCAN_CONFIRM_THRESHOLD {
            let prompt = format!(
                "Found {} files. Scan total duration? (May take time)",
                tasks.len()
            );
            if !confirm.confirm(&prompt, false) {
                return count_plan(tasks, duplicates);
            }
        }

        let durations = self.scan_durations(&tasks, interrupts, confirm);
        if self.shutdown.is_cancelled() {
            return count_plan(tasks, duplicates);
        }
        if durations.total() <= 0.0 {
            log::warn!("No video durations could be determined, counting files instead");
            return count_plan(tasks, duplicates);
        }
        log::info!(
            "Total duration: {:.2} hours across {} videos",
            durations.total() / 3600.0,
            durations.len()
        );
        RunPlan {
            mode: ProgressMode::Time {
                total_seconds: durations.total(),
            },
            tasks,
            duplicates,
            durations,
        }
    }

    /// Probes durations on a scoped thread while this thread watches for
    /// interrupts.
    fn scan_durations(
        &mut self,
        tasks: &[Task],
        interrupts: &Receiver<()>,
        confirm: &dyn Confirm,
    ) -> DurationTable {
        let spinner = self.display.add(ProgressBar::new_spinner());
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message("Scanning durations...");

        let probe = Arc::clone(&self.probe);
        let shutdown = Arc::clone(&self.shutdown);
        let scanned = thread::scope(|scope| {
            let scan = scope.spawn(|| {
                DurationTable::scan(tasks, probe.as_ref(), &shutdown, |done, total| {
                    spinner.set_message(format!("Scanning {done}/{total}"));
                })
            });

            let mut interrupts_open = true;
            while !scan.is_finished() {
                if !interrupts_open || self.shutdown.is_cancelled() {
                    thread::sleep(self.config.monitor_interval);
                    continue;
                }
                match interrupts.recv_timeout(self.config.monitor_interval) {
                    Ok(()) => self.handle_scan_interrupt(&spinner, confirm),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => interrupts_open = false,
                }
            }
            scan.join()
        });
        spinner.finish_and_clear();
        self.display.remove(&spinner);

        scanned.unwrap_or_else(|_| {
            log::error!("Duration scan panicked, counting files instead");
            DurationTable::default()
        })
    }

    fn handle_scan_interrupt(&mut self, spinner: &ProgressBar, confirm: &dyn Confirm) {
        if spinner.suspend(|| confirm.confirm(STOP_PROMPT, false)) {
            log::info!("Stopping during the duration scan");
            self.transition(SchedulerState::Cancelled);
            self.shutdown.cancel();
        }
    }

    /// Runs the plan to completion or cancellation.
    ///
    /// Each message on `interrupts` is treated as an operator interrupt.
    pub fn run(
        &mut self,
        plan: RunPlan,
        interrupts: &Receiver<()>,
        confirm: &dyn Confirm,
    ) -> CoreResult<RunOutcome> {
        let tracker = Arc::new(ProgressTracker::attached(plan.mode, self.display.clone()));
        self.run_with_tracker(plan, tracker, interrupts, confirm)
    }

    /// Like [`run`](Self::run), reporting into a caller-supplied tracker.
    /// The tracker must have been created for `plan.mode`.
    pub fn run_with_tracker(
        &mut self,
        plan: RunPlan,
        tracker: Arc<ProgressTracker>,
        interrupts: &Receiver<()>,
        confirm: &dyn Confirm,
    ) -> CoreResult<RunOutcome> {
        let started = Instant::now();
        let total_tasks = plan.tasks.len() + plan.duplicates.len();
        let spawner = self
            .spawner
            .take()
            .ok_or_else(|| CoreError::OperationFailed("Scheduler has already run".to_string()))?;

        if self.shutdown.is_cancelled() {
            log::info!("Run cancelled before any worker started");
            tracker.abandon();
            return Ok(RunOutcome {
                end: RunEnd::Cancelled { forced: false },
                reports: Vec::new(),
                total_tasks,
                final_aggregate: tracker.aggregate(),
                elapsed: started.elapsed(),
            });
        }

        let gate = Arc::new(InvocationGate::new());
        let shared = Arc::new(WorkerShared::new(
            self.ctx.clone(),
            plan.tasks.into_iter().collect::<TaskQueue>(),
            Arc::clone(&self.shutdown),
            Arc::clone(&tracker),
            Arc::clone(&self.probe),
            plan.durations,
            Box::new(VideoTranscoder::new(spawner, Arc::clone(&self.probe), gate)),
            Box::new(ImageTranscoder::new()),
            self.config.queue_poll,
        ));
        for (task, first) in plan.duplicates {
            shared.record(TaskReport {
                source: task.source,
                kind: task.kind,
                worker: "scheduler".to_string(),
                flavor: None,
                outcome: Outcome::skipped(SkipReason::SameDestination(first)),
                elapsed: Duration::ZERO,
            });
        }

        self.transition(SchedulerState::Running);
        let pool = WorkerPool::start(Arc::clone(&shared), self.config.counts)?;

        let mut interrupts_open = true;
        let mut confirmed_stop = false;
        while !pool.is_finished() {
            if !interrupts_open {
                thread::sleep(self.config.monitor_interval);
                continue;
            }
            match interrupts.recv_timeout(self.config.monitor_interval) {
                Ok(()) => {
                    if self.handle_interrupt(&tracker, confirm) {
                        confirmed_stop = true;
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => interrupts_open = false,
            }
        }

        if confirmed_stop && !self.wait_for_workers(&pool) {
            let killed = self.shutdown.kill_children();
            log::warn!(
                "Workers still running after {:?}, killed {} encoder(s)",
                self.config.grace_period,
                killed
            );
            tracker.abandon();
            return Ok(RunOutcome {
                end: RunEnd::Cancelled { forced: true },
                reports: shared.reports(),
                total_tasks,
                final_aggregate: tracker.aggregate(),
                elapsed: started.elapsed(),
            });
        }

        let joined = pool.join();
        let reports = shared.reports();
        if let Err(e) = joined {
            tracker.abandon();
            if self.state == SchedulerState::Running {
                self.transition(SchedulerState::Cancelled);
            }
            return Err(e);
        }

        let end = if self.shutdown.is_cancelled() {
            tracker.abandon();
            self.transition(SchedulerState::Cancelled);
            RunEnd::Cancelled { forced: false }
        } else {
            tracker.finish();
            self.transition(SchedulerState::Completed);
            RunEnd::Completed
        };

        Ok(RunOutcome {
            end,
            reports,
            total_tasks,
            final_aggregate: tracker.aggregate(),
            elapsed: started.elapsed(),
        })
    }

    /// Pauses the workers and asks whether to stop. Returns `true` if the
    /// run was cancelled.
    fn handle_interrupt(&mut self, tracker: &ProgressTracker, confirm: &dyn Confirm) -> bool {
        self.shutdown.pause();
        self.transition(SchedulerState::Draining);

        let stop = tracker.suspend(|| confirm.confirm(STOP_PROMPT, false));
        if stop {
            tracker.println("Stopping... (cleaning up)");
            self.transition(SchedulerState::Cancelled);
            self.shutdown.cancel();
        } else {
            tracker.println("Resuming...");
            self.transition(SchedulerState::Paused);
            self.shutdown.resume();
            self.transition(SchedulerState::Running);
        }
        stop
    }

    /// Waits up to the grace period for every worker to exit.
    fn wait_for_workers(&self, pool: &WorkerPool) -> bool {
        let deadline = Instant::now() + self.config.grace_period;
        while !pool.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use SchedulerState::*;
        assert!(Idle.can_transition_to(Running));
        assert!(Idle.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Draining.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Completed));

        assert!(!Idle.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Cancelled.can_transition_to(Running));
        assert!(!Paused.can_transition_to(Completed));
        assert!(Completed.is_terminal() && Cancelled.is_terminal());
        assert!(!Draining.is_terminal());
    }
}
