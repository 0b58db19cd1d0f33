//! Worker count resolution.
//!
//! Counts come from, in order: explicit `--cpu-workers`/`--gpu-workers`,
//! values computed by auto-configuration for whichever side was left unset,
//! and finally the legacy `--workers`/`--gpu` pair. With nothing set at all a
//! single CPU worker is used.

use crate::external::query_free_vram_mib;

use std::thread;

/// Free VRAM above which three GPU workers are started.
pub const VRAM_HIGH_MIB: u64 = 4500;
/// Free VRAM above which two GPU workers are started.
pub const VRAM_MID_MIB: u64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerCounts {
    pub cpu: usize,
    pub gpu: usize,
}

impl WorkerCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.cpu + self.gpu
    }
}

/// Hardware facts used by auto-configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareSnapshot {
    pub logical_cpus: usize,
    pub free_vram_mib: Option<u64>,
}

impl HardwareSnapshot {
    #[must_use]
    pub fn detect() -> Self {
        Self {
            logical_cpus: thread::available_parallelism().map_or(4, |n| n.get()),
            free_vram_mib: query_free_vram_mib(),
        }
    }

    /// Worker counts this hardware supports.
    #[must_use]
    pub fn recommended(&self) -> WorkerCounts {
        let gpu = match self.free_vram_mib {
            Some(free) if free > VRAM_HIGH_MIB => 3,
            Some(free) if free > VRAM_MID_MIB => 2,
            _ => 1,
        };
        WorkerCounts {
            cpu: (self.logical_cpus / 8).max(1),
            gpu,
        }
    }
}

/// Worker-count related command-line inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizingRequest {
    pub cpu_workers: Option<usize>,
    pub gpu_workers: Option<usize>,
    pub auto: Option<HardwareSnapshot>,
    pub legacy_workers: Option<usize>,
    pub legacy_gpu: bool,
}

impl SizingRequest {
    #[must_use]
    pub fn resolve(&self) -> WorkerCounts {
        let mut cpu = self.cpu_workers.unwrap_or(0);
        let mut gpu = self.gpu_workers.unwrap_or(0);

        if let Some(snapshot) = self.auto {
            let recommended = snapshot.recommended();
            if cpu == 0 {
                cpu = recommended.cpu;
            }
            if gpu == 0 {
                gpu = recommended.gpu;
            }
        }

        if cpu == 0 && gpu == 0 {
            let workers = self.legacy_workers.filter(|w| *w > 0).unwrap_or(1);
            if self.legacy_gpu {
                gpu = workers;
            } else {
                cpu = workers;
            }
        }

        WorkerCounts { cpu, gpu }
    }
}
