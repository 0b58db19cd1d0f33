//! Fixed-size pool of CPU- and GPU-flavored worker threads.

use crate::error::{CoreError, CoreResult};
use crate::sizing::WorkerCounts;
use crate::task::WorkerFlavor;
use crate::worker::{WorkerShared, run_worker};

use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct WorkerPool {
    workers: Vec<(String, JoinHandle<CoreResult<()>>)>,
}

impl WorkerPool {
    /// Starts `counts.cpu` CPU workers followed by `counts.gpu` GPU workers.
    pub fn start(shared: Arc<WorkerShared>, counts: WorkerCounts) -> CoreResult<Self> {
        let flavors = std::iter::repeat(WorkerFlavor::Cpu)
            .take(counts.cpu)
            .enumerate()
            .chain(std::iter::repeat(WorkerFlavor::Gpu).take(counts.gpu).enumerate());

        let mut workers = Vec::with_capacity(counts.total());
        for (index, flavor) in flavors {
            let name = format!("{}-{}", flavor.to_string().to_lowercase(), index);
            let shared = Arc::clone(&shared);
            let thread_name = name.clone();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(&thread_name, flavor, &shared))?;
            workers.push((name, handle));
        }
        log::debug!("Started {} CPU and {} GPU workers", counts.cpu, counts.gpu);
        Ok(Self { workers })
    }

    /// True once every worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(|(_, handle)| handle.is_finished())
    }

    /// Joins every worker and returns the first error, if any.
    pub fn join(self) -> CoreResult<()> {
        let mut first_error = None;
        for (name, handle) in self.workers {
            let result = match handle.join() {
                Ok(result) => result,
                Err(_) => Err(CoreError::WorkerPanicked(name)),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
