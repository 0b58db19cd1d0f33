// ============================================================================
// mediapress-core/src/probe.rs
// ============================================================================
//
// MEDIA PROBING: Duration and Codec Lookup
//
// Probes are one-shot and never retried. A failed probe is not an error: the
// caller gets `None` and falls back to indeterminate progress (duration) or
// always attempting the encode (codec).
//
// KEY COMPONENTS:
// - MediaProbe: Trait for duration/codec lookup
// - FfprobeMediaProbe: Runs ffprobe and decodes its JSON into the ffprobe
//   crate's types
// - DurationTable: Parallel pre-scan of all video durations
//
// ffprobe runs in its own process group, like the encoder, so a Ctrl-C
// during the pre-scan reaches mediapress and not the probes in flight.

use crate::error::{CoreError, CoreResult, command_start_error};
use crate::external::detach_process_group;
use crate::shutdown::ShutdownController;
use crate::task::{Task, TaskKind};

use ffprobe::FfProbe;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Looks up media metadata.
pub trait MediaProbe: Send + Sync {
    /// Container duration in seconds.
    fn duration(&self, path: &Path) -> Option<f64>;

    /// Codec name of the first video stream, lowercase.
    fn codec(&self, path: &Path) -> Option<String>;
}

/// The ffprobe invocation for `path`: quiet, JSON format and streams.
fn ffprobe_command(path: &Path) -> Command {
    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "quiet",
        "-show_format",
        "-show_streams",
        "-print_format",
        "json",
    ]);
    cmd.arg(path);
    cmd.stdin(Stdio::null());
    detach_process_group(&mut cmd);
    cmd
}

fn run_ffprobe(path: &Path) -> CoreResult<FfProbe> {
    let out = ffprobe_command(path)
        .output()
        .map_err(|e| command_start_error("ffprobe", e))?;
    if !out.status.success() {
        return Err(CoreError::OperationFailed(format!(
            "ffprobe exited with {} for {}",
            out.status,
            path.display()
        )));
    }
    Ok(serde_json::from_slice::<FfProbe>(&out.stdout)?)
}

fn duration_of(metadata: &FfProbe) -> Option<f64> {
    metadata
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

fn video_codec_of(metadata: &FfProbe) -> Option<String> {
    metadata
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| s.codec_name.as_deref())
        .map(|c| c.trim().to_ascii_lowercase())
}

/// `MediaProbe` backed by the ffprobe binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeMediaProbe;

impl MediaProbe for FfprobeMediaProbe {
    fn duration(&self, path: &Path) -> Option<f64> {
        match run_ffprobe(path) {
            Ok(metadata) => duration_of(&metadata),
            Err(err) => {
                log::debug!("ffprobe duration failed for {}: {}", path.display(), err);
                None
            }
        }
    }

    fn codec(&self, path: &Path) -> Option<String> {
        match run_ffprobe(path) {
            Ok(metadata) => video_codec_of(&metadata),
            Err(err) => {
                log::debug!("ffprobe codec failed for {}: {}", path.display(), err);
                None
            }
        }
    }
}

/// Pre-scanned durations of every video task, and their sum.
#[derive(Debug, Clone, Default)]
pub struct DurationTable {
    durations: HashMap<PathBuf, f64>,
    total: f64,
}

impl DurationTable {
    /// Probes every video task in parallel.
    ///
    /// `on_progress(done, total)` is called after each probe. Probing stops
    /// early (remaining files are left out) once the run is cancelled.
    pub fn scan<F>(
        tasks: &[Task],
        probe: &dyn MediaProbe,
        shutdown: &ShutdownController,
        on_progress: F,
    ) -> Self
    where
        F: Fn(usize, usize) + Sync,
    {
        let videos: Vec<&Task> = tasks.iter().filter(|t| t.kind == TaskKind::Video).collect();
        let total = videos.len();
        let done = AtomicUsize::new(0);

        let table: Self = videos
            .par_iter()
            .filter_map(|task| {
                if shutdown.is_cancelled() {
                    return None;
                }
                let duration = probe.duration(&task.source);
                on_progress(done.fetch_add(1, Ordering::SeqCst) + 1, total);
                duration.map(|d| (task.source.clone(), d))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        log::debug!(
            "Duration scan: {} of {} videos probed, {:.1}s total",
            table.len(),
            total,
            table.total
        );
        table
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<f64> {
        self.durations.get(path).copied()
    }

    /// Sum of all known durations, in seconds.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.total
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.durations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }
}

impl FromIterator<(PathBuf, f64)> for DurationTable {
    fn from_iter<I: IntoIterator<Item = (PathBuf, f64)>>(iter: I) -> Self {
        let mut table = Self::default();
        for (path, duration) in iter {
            if !(duration.is_finite() && duration > 0.0) {
                continue;
            }
            if let Some(old) = table.durations.insert(path, duration) {
                table.total -= old;
            }
            table.total += duration;
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedProbe;

    impl MediaProbe for FixedProbe {
        fn duration(&self, path: &Path) -> Option<f64> {
            match path.file_stem()?.to_str()? {
                "broken" => None,
                stem => stem.trim_start_matches('v').parse().ok(),
            }
        }

        fn codec(&self, _path: &Path) -> Option<String> {
            None
        }
    }

    fn tasks(names: &[&str]) -> Vec<Task> {
        names.iter().map(|n| Task::new(format!("/in/{n}")).unwrap()).collect()
    }

    #[test]
    fn test_scan_sums_known_video_durations() {
        let tasks = tasks(&["v10.mp4", "v5.mkv", "broken.mov", "v7.png"]);
        let calls = Mutex::new(Vec::new());
        let table = DurationTable::scan(&tasks, &FixedProbe, &ShutdownController::new(), |d, t| {
            calls.lock().unwrap().push((d, t))
        });

        assert_eq!(table.len(), 2);
        assert_eq!(table.total(), 15.0);
        assert_eq!(table.get(Path::new("/in/v10.mp4")), Some(10.0));
        assert_eq!(table.get(Path::new("/in/broken.mov")), None);
        assert_eq!(table.get(Path::new("/in/v7.png")), None);

        let calls = calls.into_inner().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, t)| *t == 3));
    }

    #[test]
    fn test_scan_after_cancel_is_empty() {
        let shutdown = ShutdownController::new();
        shutdown.cancel();
        let table = DurationTable::scan(&tasks(&["v10.mp4"]), &FixedProbe, &shutdown, |_, _| {});
        assert!(table.is_empty());
        assert_eq!(table.total(), 0.0);
    }

    #[test]
    fn test_duration_and_codec_fields() {
        use ffprobe::Stream;

        let mut metadata = FfProbe::default();
        metadata.format.duration = Some(" 12.500000".into());
        metadata.streams = vec![
            Stream {
                codec_type: Some("audio".into()),
                codec_name: Some("aac".into()),
                ..Stream::default()
            },
            Stream {
                codec_type: Some("video".into()),
                codec_name: Some("HEVC".into()),
                ..Stream::default()
            },
        ];
        assert_eq!(duration_of(&metadata), Some(12.5));
        assert_eq!(video_codec_of(&metadata).as_deref(), Some("hevc"));

        metadata.format.duration = Some("N/A".into());
        metadata.streams.truncate(1);
        assert_eq!(duration_of(&metadata), None);
        assert_eq!(video_codec_of(&metadata), None);
    }

    #[test]
    fn test_inspect_command_args() {
        let cmd = ffprobe_command(Path::new("/in/a.mkv"));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.get_program(), "ffprobe");
        assert_eq!(args.last().map(String::as_str), Some("/in/a.mkv"));
        assert!(args.windows(2).any(|w| w == ["-print_format", "json"]));
    }

    #[test]
    fn test_from_iter_ignores_invalid() {
        let table: DurationTable = vec![
            (PathBuf::from("a"), 3.0),
            (PathBuf::from("b"), f64::NAN),
            (PathBuf::from("c"), 0.0),
            (PathBuf::from("a"), 4.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(table.len(), 1);
        assert_eq!(table.total(), 4.0);
    }
}
