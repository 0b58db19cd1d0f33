// ============================================================================
// mediapress-core/src/progress.rs
// ============================================================================
//
// PROGRESS TRACKING: Per-Task and Aggregate Progress
//
// This module owns the run-wide aggregate counter and the per-task progress
// handles that feed it, and renders both with indicatif.
//
// KEY COMPONENTS:
// - ProgressMode: Aggregate unit, seconds of media (Time) or files (Count)
// - ProgressTracker: Aggregate counter plus the MultiProgress that draws it
// - TaskProgress: Handle owned by the worker processing one task
//
// CREDIT MODEL:
// Every task carries a credit budget: its pre-scanned duration in Time mode
// (zero if unknown) or one unit in Count mode. Intermediate updates credit the
// delta since the last update, capped at the budget. Completion credits
// whatever is left of the budget; abortion credits nothing more. The
// aggregate itself is clamped at the mode's total, so it can never overshoot
// the estimate.

use crate::task::TaskReport;
use crate::reporting::report_lines;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Log target for per-task summary lines.
pub const REPORT_TARGET: &str = "mediapress::report";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressMode {
    Time { total_seconds: f64 },
    Count { total_tasks: usize },
}

impl ProgressMode {
    #[must_use]
    pub fn total(&self) -> f64 {
        match *self {
            ProgressMode::Time { total_seconds } => total_seconds.max(0.0),
            ProgressMode::Count { total_tasks } => total_tasks as f64,
        }
    }

    fn to_units(self, value: f64) -> u64 {
        match self {
            ProgressMode::Time { .. } => (value * 1000.0).round() as u64,
            ProgressMode::Count { .. } => value.round() as u64,
        }
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

#[derive(Debug)]
struct Aggregate {
    mode: ProgressMode,
    value: Mutex<f64>,
    bar: ProgressBar,
}

impl Aggregate {
    fn advance(&self, delta: f64) {
        if !(delta.is_finite() && delta > 0.0) {
            return;
        }
        let total = self.mode.total();
        let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        let next = (*value + delta).min(total);
        if next > *value {
            *value = next;
            self.bar.set_position(self.mode.to_units(next));
            if let ProgressMode::Time { .. } = self.mode {
                self.bar
                    .set_message(format!("{:.2}h remaining", (total - next) / 3600.0));
            }
        }
    }

    fn value(&self) -> f64 {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// TRACKER
// ============================================================================

/// Run-wide progress: one aggregate bar plus one bar per in-flight task.
#[derive(Debug)]
pub struct ProgressTracker {
    multi: MultiProgress,
    aggregate: Arc<Aggregate>,
}

impl ProgressTracker {
    /// Tracker that draws nothing. Used by tests and non-interactive runs.
    #[must_use]
    pub fn hidden(mode: ProgressMode) -> Self {
        Self::attached(mode, MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    /// Tracker drawing its bars into an existing `MultiProgress`, so other
    /// output routed through the same display (log lines, prompts) does not
    /// tear them.
    #[must_use]
    pub fn attached(mode: ProgressMode, multi: MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new(mode.to_units(mode.total())));
        let (template, prefix) = match mode {
            ProgressMode::Time { .. } => (
                "{prefix:.bold} [{elapsed_precise}] [{bar:40.green/white}] {percent:>3}% {msg}",
                "Total Progress",
            ),
            ProgressMode::Count { .. } => (
                "{prefix:.bold} [{elapsed_precise}] [{bar:40.green/white}] {pos}/{len}",
                "Files Processed",
            ),
        };
        bar.set_style(
            ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(prefix);
        if let ProgressMode::Time { total_seconds } = mode {
            bar.set_message(format!("{:.2}h remaining", total_seconds / 3600.0));
        }

        Self {
            multi,
            aggregate: Arc::new(Aggregate {
                mode,
                value: Mutex::new(0.0),
                bar,
            }),
        }
    }

    #[must_use]
    pub fn mode(&self) -> ProgressMode {
        self.aggregate.mode
    }

    /// Creates the handle for a freshly dequeued task.
    ///
    /// `duration` is the pre-scanned media duration, if any. It sizes the
    /// per-task bar and, in Time mode, the task's credit budget.
    #[must_use]
    pub fn new_task(&self, label: impl Into<String>, duration: Option<f64>) -> TaskProgress {
        let duration = duration.filter(|d| d.is_finite() && *d > 0.0);
        let budget = match self.aggregate.mode {
            ProgressMode::Time { .. } => duration.unwrap_or(0.0),
            ProgressMode::Count { .. } => 1.0,
        };
        TaskProgress {
            label: label.into(),
            total: duration,
            budget,
            credited: 0.0,
            last_value: 0.0,
            multi: self.multi.clone(),
            aggregate: Arc::clone(&self.aggregate),
            bar: None,
        }
    }

    /// Moves a task's progress to `absolute` seconds.
    pub fn update(&self, handle: &mut TaskProgress, absolute: f64) {
        handle.update(absolute);
    }

    /// Adds `delta` directly to the aggregate, clamped at the total.
    pub fn advance_aggregate(&self, delta: f64) {
        self.aggregate.advance(delta);
    }

    /// Credits whatever remains of the task's budget and removes its bar.
    pub fn complete_task(&self, handle: TaskProgress) {
        handle.complete();
    }

    /// Removes the task's bar without crediting anything further.
    pub fn abort_task(&self, handle: TaskProgress) {
        handle.abort();
    }

    #[must_use]
    pub fn aggregate(&self) -> f64 {
        self.aggregate.value()
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.aggregate.mode.total()
    }

    /// Prints the summary lines for a finished task above the bars and sends
    /// them to the log.
    pub fn report(&self, report: &TaskReport) {
        for line in report_lines(report) {
            log::info!(target: REPORT_TARGET, "{}", console::strip_ansi_codes(&line));
            if self.multi.println(&line).is_err() {
                log::debug!("Progress output unavailable, summary line not drawn");
            }
        }
    }

    /// Prints one line above the bars.
    pub fn println(&self, line: &str) {
        let _ = self.multi.println(line);
    }

    /// Hides the bars while `f` runs, e.g. for an interactive prompt.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.multi.suspend(f)
    }

    pub fn finish(&self) {
        self.aggregate.bar.finish();
    }

    pub fn abandon(&self) {
        self.aggregate.bar.abandon();
    }
}

// ============================================================================
// PER-TASK HANDLE
// ============================================================================

/// Progress of one in-flight task. Owned by a single worker, never shared.
#[derive(Debug)]
pub struct TaskProgress {
    label: String,
    total: Option<f64>,
    budget: f64,
    credited: f64,
    last_value: f64,
    multi: MultiProgress,
    aggregate: Arc<Aggregate>,
    bar: Option<ProgressBar>,
}

impl TaskProgress {
    /// Shows the per-task bar: determinate when the duration is known,
    /// a spinner otherwise.
    pub fn show(&mut self) {
        if self.bar.is_some() {
            return;
        }
        let bar = match self.total {
            Some(total) => {
                let bar = ProgressBar::new((total * 1000.0).round() as u64);
                bar.set_style(
                    ProgressStyle::with_template(
                        "  {prefix:>6.bold} {wide_msg} [{bar:30.cyan/blue}] {percent:>3}%",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("  {prefix:>6.bold} {spinner} {wide_msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            }
        };
        bar.set_message(self.label.clone());
        self.bar = Some(self.multi.add(bar));
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.set_prefix(prefix.into());
        }
    }

    /// Moves this task to `absolute` seconds of processed media. Never
    /// regresses, and never credits more than the task's budget.
    pub fn update(&mut self, absolute: f64) {
        if !absolute.is_finite() || absolute <= self.last_value {
            return;
        }
        self.last_value = absolute;
        if let (Some(bar), Some(total)) = (&self.bar, self.total) {
            bar.set_position((absolute.min(total) * 1000.0).round() as u64);
        }
        if let ProgressMode::Time { .. } = self.aggregate.mode {
            let target = absolute.min(self.budget);
            let delta = target - self.credited;
            if delta > 0.0 {
                self.credited = target;
                self.aggregate.advance(delta);
            }
        }
    }

    /// Amount this task has added to the aggregate so far.
    #[cfg(test)]
    fn credited(&self) -> f64 {
        self.credited
    }

    pub fn complete(mut self) {
        let remaining = self.budget - self.credited;
        if remaining > 0.0 {
            self.credited = self.budget;
            self.aggregate.advance(remaining);
        }
    }

    pub fn abort(self) {}
}

impl Drop for TaskProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }
}
