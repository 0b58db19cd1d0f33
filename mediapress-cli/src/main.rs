// ============================================================================
// mediapress-cli/src/main.rs
// ============================================================================
//
// MEDIAPRESS CLI: Entry point
//
// Parses arguments, runs the compression command and maps the result to an
// exit code: 0 for a finished run (failed tasks included), 1 for an error,
// 130 when the run was interrupted.

use clap::Parser;
use console::style;
use mediapress_cli::{Cli, RunStatus, run_compress};
use std::process;

fn main() {
    let cli = Cli::parse();

    match run_compress(cli) {
        Ok(RunStatus::Finished | RunStatus::NothingToDo) => {}
        Ok(RunStatus::Cancelled { .. }) => process::exit(130),
        Err(e) => {
            log::debug!("Run failed: {}", e);
            eprintln!("{} {}", style("Error:").red().bold(), e);
            process::exit(1);
        }
    }
}
