// ============================================================================
// mediapress-core/src/lib.rs
// ============================================================================
//
// MEDIAPRESS CORE: Batch Media Compression Scheduler
//
// This library drains a queue of media files through a pool of CPU and GPU
// workers. Videos are re-encoded to HEVC by an external ffmpeg process whose
// progress is streamed into per-task and aggregate progress bars; images are
// re-encoded in-process. Runs can be paused and cancelled interactively.
//
// KEY COMPONENTS:
// - TaskQueue: Thread-safe FIFO with bounded-wait pop
// - MediaProbe: Duration and codec lookup (ffprobe)
// - Transcoder: Video (external encoder) and image (in-process) processing
// - ProgressTracker: Per-task bars and one aggregate counter
// - ShutdownController: Cooperative pause and cancellation
// - WorkerPool / Scheduler: Worker threads and the driver state machine
//
// OUTPUT PROTOCOL:
// Outputs mirror the input tree under the output root and appear under
// their final name only after they are complete (write to a private `.part`, then
// rename). An existing destination means the task is skipped.

pub mod config;
pub mod discovery;
pub mod error;
pub mod external;
pub mod pool;
pub mod probe;
pub mod progress;
pub mod queue;
pub mod reporting;
pub mod scheduler;
pub mod shutdown;
pub mod sizing;
pub mod task;
pub mod temp_files;
pub mod transcode;
pub mod utils;
pub mod worker;

// ---- Re-exports ----
pub use config::{ProcessingContext, QualityParams, resolve_output_root};
pub use discovery::find_processable_files;
pub use error::{CoreError, CoreResult};
pub use external::{
    EncodeJob, EncoderEvents, EncoderProcess, EncoderSpawner, SidecarSpawner, check_dependency,
};
pub use pool::WorkerPool;
pub use probe::{DurationTable, FfprobeMediaProbe, MediaProbe};
pub use progress::{ProgressMode, ProgressTracker, TaskProgress};
pub use queue::TaskQueue;
pub use reporting::RunSummary;
pub use scheduler::{
    Confirm, RunEnd, RunOutcome, RunPlan, ScanPolicy, Scheduler, SchedulerConfig, SchedulerState,
};
pub use shutdown::ShutdownController;
pub use sizing::{HardwareSnapshot, SizingRequest, WorkerCounts};
pub use task::{Outcome, SkipReason, Task, TaskKind, TaskReport, WorkerFlavor};
pub use transcode::{ImageTranscoder, TaskEnv, Transcoder, VideoTranscoder};
