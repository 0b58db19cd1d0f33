// ============================================================================
// mediapress-cli/src/cli.rs
// ============================================================================
//
// COMMAND-LINE ARGUMENTS: clap definitions for the `mediapress` binary
//
// Every tuning flag can also be set through a MEDIAPRESS_* environment
// variable. Range checks on CRF and image quality happen here; the preset
// name and path relationships are checked by ProcessingContext::validate.

use clap::Parser;
use mediapress_core::config::{DEFAULT_CRF, DEFAULT_IMAGE_QUALITY, DEFAULT_PRESET};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Mediapress: batch media compression",
    long_about = "Re-encodes videos to HEVC (x265 or NVENC) and images to WebP \
                  across a pool of CPU and GPU workers, mirroring the input tree."
)]
pub struct Cli {
    /// Input file or directory
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file or directory (defaults next to the input)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    // --- Quality ---
    /// Constant rate factor for video (0-51, lower is better quality)
    #[arg(long, env = "MEDIAPRESS_CRF", default_value_t = DEFAULT_CRF,
          value_parser = clap::value_parser!(u8).range(0..=51))]
    pub crf: u8,

    /// x265 preset name (mapped to an NVENC preset on GPU workers)
    #[arg(long, env = "MEDIAPRESS_PRESET", default_value = DEFAULT_PRESET)]
    pub preset: String,

    /// Image quality (1-100)
    #[arg(long, env = "MEDIAPRESS_IMAGE_QUALITY", default_value_t = DEFAULT_IMAGE_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub image_quality: u8,

    /// Keep the original image format instead of converting to WebP
    #[arg(long, env = "MEDIAPRESS_KEEP_FORMAT")]
    pub keep_format: bool,

    /// Delete each source file after it has been encoded successfully
    #[arg(long, env = "MEDIAPRESS_DELETE_SOURCE")]
    pub delete_source: bool,

    // --- Workers ---
    /// Number of CPU (libx265) workers
    #[arg(long, env = "MEDIAPRESS_CPU_WORKERS", value_name = "N")]
    pub cpu_workers: Option<usize>,

    /// Number of GPU (hevc_nvenc) workers
    #[arg(long, env = "MEDIAPRESS_GPU_WORKERS", value_name = "N")]
    pub gpu_workers: Option<usize>,

    /// Size the pool from logical CPUs and free GPU memory
    #[arg(long, env = "MEDIAPRESS_AUTO_CONFIG")]
    pub auto_config: bool,

    /// Legacy worker count; all CPU unless --gpu is given
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Make the legacy --workers count GPU workers
    #[arg(long)]
    pub gpu: bool,

    // --- Progress and shutdown ---
    /// Skip the duration pre-scan and count files instead
    #[arg(long, env = "MEDIAPRESS_NO_SCAN_DURATION")]
    pub no_scan_duration: bool,

    /// Seconds to wait for workers after a confirmed stop
    #[arg(long, env = "MEDIAPRESS_GRACE_SECS", value_name = "SECS", default_value_t = 5)]
    pub grace_secs: u64,

    // --- Output ---
    /// Directory for log files (defaults to OUTPUT/logs)
    #[arg(long, env = "MEDIAPRESS_LOG_DIR", value_name = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Show debug output on the console
    #[arg(short, long)]
    pub verbose: bool,
}
