// ============================================================================
// mediapress-core/src/reporting.rs
// ============================================================================
//
// REPORTING: Per-Task Summary Lines and Run Summary
//
// Formats the terminal line(s) printed when a task finishes and aggregates
// all task reports into a serializable run summary.

use crate::error::CoreResult;
use crate::task::{Outcome, TaskReport};
use crate::utils::{calculate_size_reduction, format_bytes};

use chrono::{DateTime, Local};
use console::style;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

/// Lines printed when a task reaches its terminal state.
#[must_use]
pub fn report_lines(report: &TaskReport) -> Vec<String> {
    let name = report.display_name();
    match &report.outcome {
        Outcome::Completed {
            input_size,
            output_size,
            source_deleted,
            delete_error,
        } => {
            let saved = input_size.saturating_sub(*output_size);
            let flavor = report
                .flavor
                .map_or_else(|| "-".to_string(), |f| f.to_string());
            let mut lines = vec![format!(
                "{} Finished ({}): {} (Saved: {} ({:.1}%))",
                style("✓").green().bold(),
                flavor,
                name,
                format_bytes(saved),
                calculate_size_reduction(*input_size, *output_size)
            )];
            if *source_deleted {
                lines.push(format!("  {} {}", style("Deleted source:").dim(), name));
            }
            if let Some(error) = delete_error {
                lines.push(format!(
                    "  {} {} ({})",
                    style("Failed to delete source:").red(),
                    name,
                    error
                ));
            }
            lines
        }
        Outcome::Skipped { reason } => vec![format!(
            "{} Skipping {} ({})",
            style("⊘").yellow(),
            name,
            reason
        )],
        Outcome::Failed { error, tail } => {
            let mut lines = vec![format!(
                "{} Error processing {} ({})",
                style("✗").red().bold(),
                name,
                error
            )];
            lines.extend(tail.iter().map(|l| format!("    {}", style(l).dim())));
            lines
        }
        Outcome::Aborted => vec![format!("{} {}", style("Stopped").yellow(), name)],
    }
}

/// Everything that happened during one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub elapsed_secs: f64,
    pub cancelled: bool,
    pub total_tasks: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted: usize,
    pub not_started: usize,
    /// Completed tasks whose source could not be deleted.
    pub delete_failures: usize,
    pub saved_bytes: u64,
    pub tasks: Vec<TaskReport>,
}

impl RunSummary {
    #[must_use]
    pub fn new(
        reports: Vec<TaskReport>,
        total_tasks: usize,
        started_at: DateTime<Local>,
        elapsed: Duration,
        cancelled: bool,
    ) -> Self {
        let mut summary = Self {
            started_at: started_at.to_rfc3339(),
            elapsed_secs: elapsed.as_secs_f64(),
            cancelled,
            total_tasks,
            completed: 0,
            skipped: 0,
            failed: 0,
            aborted: 0,
            not_started: total_tasks.saturating_sub(reports.len()),
            delete_failures: 0,
            saved_bytes: 0,
            tasks: Vec::new(),
        };
        for report in &reports {
            match &report.outcome {
                Outcome::Completed { delete_error, .. } => {
                    summary.completed += 1;
                    if delete_error.is_some() {
                        summary.delete_failures += 1;
                    }
                }
                Outcome::Skipped { .. } => summary.skipped += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::Aborted => summary.aborted += 1,
            }
            summary.saved_bytes += report.outcome.saved_bytes();
        }
        summary.tasks = reports;
        summary
    }

    /// Writes the summary as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        log::debug!("Run report written to {}", path.display());
        Ok(())
    }
}
