//! The compression run: discovery, setup, the scheduler and the summary.

use crate::cli::Cli;
use crate::error::{CliErrorContext, CliResult};
use crate::logging::setup_logging;
use crate::terminal::{self, TermConfirm};

use mediapress_core::utils::{format_bytes, format_duration};
use mediapress_core::{
    CoreError, FfprobeMediaProbe, HardwareSnapshot, ProcessingContext, ProgressMode, QualityParams,
    RunEnd, RunSummary, ScanPolicy, Scheduler, SchedulerConfig, ShutdownController,
    SidecarSpawner, SizingRequest, Task, TaskKind, WorkerCounts, check_dependency,
    find_processable_files, resolve_output_root,
};

use indicatif::MultiProgress;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, mpsc};
use std::time::Duration;

/// How a run ended, for the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    NothingToDo,
    Cancelled { forced: bool },
}

/// Canonicalizes the input path, rejecting anything that does not exist.
pub fn resolve_input(input: &Path) -> CliResult<PathBuf> {
    input.canonicalize().map_err(|e| {
        CoreError::PathError(format!("Invalid input path '{}': {}", input.display(), e))
    })
}

/// Log directory default: `<output dir>/logs`, using the parent for single-file output.
fn default_log_dir(input: &Path, output_root: &Path) -> PathBuf {
    let output_dir = if input.is_dir() {
        output_root
    } else {
        output_root
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    };
    output_dir.join("logs")
}

fn build_context(cli: &Cli, input: PathBuf, output_root: PathBuf) -> CliResult<ProcessingContext> {
    let ctx = ProcessingContext {
        input_root: input,
        output_root,
        quality: QualityParams {
            crf: cli.crf,
            preset: cli.preset.clone(),
            image_quality: cli.image_quality,
        },
        delete_source: cli.delete_source,
        image_keep_format: cli.keep_format,
    };
    ctx.validate()?;
    Ok(ctx)
}

fn resolve_workers(cli: &Cli) -> WorkerCounts {
    let auto = cli.auto_config.then(HardwareSnapshot::detect);
    if let Some(snapshot) = auto {
        let recommended = snapshot.recommended();
        terminal::print_status("Logical CPUs", &snapshot.logical_cpus.to_string(), false);
        let vram = snapshot
            .free_vram_mib
            .map_or_else(|| "unknown".to_string(), |mib| format!("{mib} MiB"));
        terminal::print_status("Free VRAM", &vram, false);
        terminal::print_status(
            "Recommended",
            &format!("{} CPU, {} GPU", recommended.cpu, recommended.gpu),
            false,
        );
    }
    SizingRequest {
        cpu_workers: cli.cpu_workers,
        gpu_workers: cli.gpu_workers,
        auto,
        legacy_workers: cli.workers,
        legacy_gpu: cli.gpu,
    }
    .resolve()
}

fn print_setup(ctx: &ProcessingContext, tasks: &[Task], counts: WorkerCounts) {
    let videos = tasks.iter().filter(|t| t.kind == TaskKind::Video).count();
    terminal::print_section("Setup");
    terminal::print_status("Input", &ctx.input_root.display().to_string(), false);
    terminal::print_status("Output", &ctx.output_root.display().to_string(), false);
    terminal::print_status(
        "Files",
        &format!("{} ({} videos, {} images)", tasks.len(), videos, tasks.len() - videos),
        true,
    );
    terminal::print_status(
        "Video",
        &format!("CRF {}, preset {}", ctx.quality.crf, ctx.quality.preset),
        false,
    );
    let image_target = if ctx.image_keep_format {
        "original format"
    } else {
        "WebP"
    };
    terminal::print_status(
        "Images",
        &format!("quality {}, {}", ctx.quality.image_quality, image_target),
        false,
    );
    terminal::print_status(
        "Workers",
        &format!("{} CPU, {} GPU", counts.cpu, counts.gpu),
        true,
    );
}

fn print_delete_warning() {
    terminal::print_warning("WARNING: --delete-source is set.");
    terminal::print_warning(
        "Source files will be permanently deleted after they are encoded successfully.",
    );
}

fn print_summary(summary: &RunSummary) {
    terminal::print_section("Summary");
    terminal::print_status("Completed", &summary.completed.to_string(), true);
    terminal::print_status("Skipped", &summary.skipped.to_string(), false);
    terminal::print_status("Failed", &summary.failed.to_string(), summary.failed > 0);
    if summary.aborted > 0 || summary.not_started > 0 {
        terminal::print_status("Stopped", &summary.aborted.to_string(), false);
        terminal::print_status("Not started", &summary.not_started.to_string(), false);
    }
    if summary.delete_failures > 0 {
        terminal::print_status(
            "Not deleted",
            &format!("{} source(s), see above", summary.delete_failures),
            true,
        );
    }
    terminal::print_status("Saved", &format_bytes(summary.saved_bytes), true);
    terminal::print_status("Elapsed", &format_duration(summary.elapsed_secs), false);
}

/// Installs the Ctrl-C handler. Interrupts are forwarded to the scheduler,
/// except while a prompt is open, when every running encoder is killed and
/// the process exits immediately.
fn install_interrupt_handler(
    confirm: &TermConfirm,
    shutdown: Arc<ShutdownController>,
) -> CliResult<mpsc::Receiver<()>> {
    let (tx, rx) = mpsc::channel();
    let prompt_open = confirm.prompt_open();
    ctrlc::set_handler(move || {
        if prompt_open.load(Ordering::SeqCst) {
            let killed = shutdown.kill_children();
            log::warn!("Forced exit, killed {} encoder(s)", killed);
            eprintln!("\n{}", console::style("Forced Exit!").red().bold());
            std::process::exit(130);
        }
        let _ = tx.send(());
    })
    .map_err(|e| CoreError::OperationFailed(format!("Failed to install Ctrl-C handler: {e}")))?;
    Ok(rx)
}

pub fn run_compress(cli: Cli) -> CliResult<RunStatus> {
    let input = resolve_input(&cli.input)?;
    let output_root = resolve_output_root(&input, cli.output.as_deref(), cli.keep_format)?;
    let ctx = build_context(&cli, input, output_root)?;

    let display = MultiProgress::new();
    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| default_log_dir(&ctx.input_root, &ctx.output_root));
    let log_path = setup_logging(&log_dir, cli.verbose, display.clone())
        .map_err(|e| CoreError::OperationFailed(format!("{e:#}")))?;
    log::info!("Mediapress run started, logging to {}", log_path.display());

    let tasks = match find_processable_files(&ctx.input_root) {
        Ok(tasks) => tasks,
        Err(CoreError::NoFilesFound(_)) => {
            terminal::print_line("No media files found!");
            return Ok(RunStatus::NothingToDo);
        }
        Err(e) => return Err(e),
    };

    if ctx.input_root.is_dir() {
        std::fs::create_dir_all(&ctx.output_root).cli_with_context(|| {
            format!("Failed to create output directory '{}'", ctx.output_root.display())
        })?;
    }

    let counts = resolve_workers(&cli);
    print_setup(&ctx, &tasks, counts);
    if ctx.delete_source {
        print_delete_warning();
    }

    if tasks.iter().any(|t| t.kind == TaskKind::Video) {
        if let Err(e) = check_dependency("ffprobe") {
            terminal::print_warning(&format!(
                "{e} Durations and codecs cannot be detected."
            ));
        }
    }

    let config = SchedulerConfig {
        counts,
        grace_period: Duration::from_secs(cli.grace_secs),
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::new(ctx, SidecarSpawner, Arc::new(FfprobeMediaProbe), config)
        .with_display(display);
    let confirm = TermConfirm::new();
    let interrupts = install_interrupt_handler(&confirm, scheduler.shutdown())?;

    let policy = if cli.no_scan_duration {
        ScanPolicy::Skip
    } else {
        ScanPolicy::Auto
    };
    let plan = scheduler.plan(tasks, policy, &interrupts, &confirm);
    match plan.mode {
        ProgressMode::Time { total_seconds } => terminal::print_status(
            "Progress",
            &format!("by duration ({:.2} hours)", total_seconds / 3600.0),
            false,
        ),
        ProgressMode::Count { total_tasks } => {
            terminal::print_status("Progress", &format!("by file count ({total_tasks})"), false);
        }
    }

    terminal::print_section("Processing");
    let started_at = chrono::Local::now();
    let outcome = scheduler.run(plan, &interrupts, &confirm)?;

    let cancelled = outcome.end != RunEnd::Completed;
    let summary = RunSummary::new(
        outcome.reports,
        outcome.total_tasks,
        started_at,
        outcome.elapsed,
        cancelled,
    );
    print_summary(&summary);

    if let Some(report_path) = &cli.report {
        summary
            .write_json(report_path)
            .cli_with_context(|| format!("Failed to write report '{}'", report_path.display()))?;
        terminal::print_status("Report", &report_path.display().to_string(), false);
    }

    Ok(match outcome.end {
        RunEnd::Completed => RunStatus::Finished,
        RunEnd::Cancelled { forced } => {
            if forced {
                log::warn!("Exiting after killing encoders that ignored the stop request");
            }
            RunStatus::Cancelled { forced }
        }
    })
}
