//! Command implementations for the CLI.

/// The compression run.
pub mod compress;
