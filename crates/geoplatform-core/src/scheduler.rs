//! Task schedulers that run client work off the calling thread.
//!
//! Request tasks block their worker while a remote sub-call is in flight,
//! so a pool needs at least as many workers as requests expected to be in
//! flight at once.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted tasks eventually, in unspecified order.
pub trait TaskScheduler: Send + Sync {
    fn schedule_task(&self, task: Task);
}

/// Run `task` on `scheduler`, or inline when no scheduler is configured.
pub fn execute_or_schedule(
    scheduler: Option<&Arc<dyn TaskScheduler>>,
    task: impl FnOnce() + Send + 'static,
) {
    match scheduler {
        Some(scheduler) => scheduler.schedule_task(Box::new(task)),
        None => task(),
    }
}

/// A fixed-size pool of worker threads fed by a shared queue.
///
/// Dropping the pool closes the queue; workers finish the tasks already
/// queued and exit.
pub struct ThreadPoolTaskScheduler {
    sender: async_channel::Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolTaskScheduler {
    /// Start a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let (sender, receiver) = async_channel::unbounded::<Task>();

        let workers = (0..threads.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("geoplatform-worker-{index}"))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv_blocking() {
                            task();
                        }
                        tracing::trace!(worker = index, "worker exiting");
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(Self { sender, workers })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl TaskScheduler for ThreadPoolTaskScheduler {
    fn schedule_task(&self, task: Task) {
        if self.sender.send_blocking(task).is_err() {
            tracing::warn!("task scheduled on a closed pool was dropped");
        }
    }
}

impl Drop for ThreadPoolTaskScheduler {
    fn drop(&mut self) {
        self.sender.close();
        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            // The last reference may be dropped by a task on one of our own
            // workers; that worker cannot join itself.
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
    }
}
