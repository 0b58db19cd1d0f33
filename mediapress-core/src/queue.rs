//! Thread-safe FIFO of pending tasks.
//!
//! Workers call [`TaskQueue::pop`] with a bounded timeout so that they get a
//! chance to re-check shutdown state even when the queue is quiet. A `None`
//! from `pop` while the queue is empty is the worker's signal to exit.

use crate::task::Task;

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct TaskQueue {
    items: Mutex<VecDeque<Task>>,
    available: Condvar,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, task: Task) {
        self.lock().push_back(task);
        self.available.notify_one();
    }

    /// Removes the oldest task, waiting at most `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<Task> {
        let guard = self.lock();
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        guard.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl FromIterator<Task> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self {
            items: Mutex::new(iter.into_iter().collect()),
            available: Condvar::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn task(name: &str) -> Task {
        Task::new(format!("/in/{name}.mp4")).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let queue: TaskQueue = ["a", "b", "c"].into_iter().map(task).collect();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(Duration::ZERO), Some(task("a")));
        assert_eq!(queue.pop(Duration::ZERO), Some(task("b")));
        assert_eq!(queue.pop(Duration::ZERO), Some(task("c")));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_times_out_on_empty_queue() {
        let queue = TaskQueue::new();
        let start = Instant::now();
        assert_eq!(queue.pop(Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let queue = Arc::new(TaskQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(task("late"));
        assert_eq!(consumer.join().unwrap(), Some(task("late")));
    }

    #[test]
    fn test_each_task_delivered_once() {
        let queue: Arc<TaskQueue> = Arc::new((0..200).map(|i| task(&i.to_string())).collect());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(t) = queue.pop(Duration::from_millis(10)) {
                        seen.push(t.source);
                    }
                    seen
                })
            })
            .collect();

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
    }
}
