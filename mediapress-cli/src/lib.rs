// mediapress-cli/src/lib.rs
//
// Library portion of the Mediapress CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod terminal;

pub use cli::Cli;
pub use commands::compress::{RunStatus, run_compress};
