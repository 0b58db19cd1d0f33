// ============================================================================
// mediapress-cli/src/logging.rs
// ============================================================================
//
// LOGGING: fern dispatch for the `log` facade
//
// Two chains share one logger:
// - file: everything at Debug and above, timestamped, written to
//   <log_dir>/mediapress_run_<timestamp>.log
// - console: stderr at Warn (Debug with --verbose), written with the
//   progress display suspended so log lines land above the bars instead of
//   through them
//
// Per-task summary lines are logged under the report target so they land
// in the file; the console chain drops them because the progress display
// has already printed them.

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use log::LevelFilter;
use mediapress_core::progress::REPORT_TARGET;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Console sink that hides the progress bars while each line is written.
fn console_output<W>(display: MultiProgress, writer: W) -> fern::Output
where
    W: Write + Send + 'static,
{
    let writer = Mutex::new(writer);
    fern::Output::call(move |record| {
        display.suspend(|| {
            if let Ok(mut writer) = writer.lock() {
                let _ = writeln!(writer, "{}", record.args());
                let _ = writer.flush();
            }
        });
    })
}

fn console_chain<W>(level: LevelFilter, display: MultiProgress, writer: W) -> fern::Dispatch
where
    W: Write + Send + 'static,
{
    fern::Dispatch::new()
        .level(level)
        .filter(|metadata| metadata.target() != REPORT_TARGET)
        .format(|out, message, record| {
            out.finish(format_args!("{}: {}", record.level(), message))
        })
        .chain(console_output(display, writer))
}

/// Installs the global logger and returns the path of the run log.
///
/// Console lines are drawn through `display`, the same `MultiProgress` the
/// scheduler draws its bars on.
pub fn setup_logging(log_dir: &Path, verbose: bool, display: MultiProgress) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory '{}'", log_dir.display()))?;
    let log_path = log_dir.join(format!("mediapress_run_{}.log", get_timestamp()));
    let log_file = fern::log_file(&log_path)
        .with_context(|| format!("Failed to open log file '{}'", log_path.display()))?;

    let console_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let file_chain = fern::Dispatch::new()
        .level(LevelFilter::Debug)
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                console::strip_ansi_codes(&message.to_string())
            ))
        })
        .chain(log_file);

    fern::Dispatch::new()
        .chain(file_chain)
        .chain(console_chain(console_level, display, std::io::stderr()))
        .apply()
        .context("Failed to install logger")?;

    Ok(log_path)
}
