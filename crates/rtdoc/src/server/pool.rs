use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use super::queue::WorkQueue;

/// Fixed set of worker threads draining a [`WorkQueue`]
///
/// Each worker runs one task to completion before popping the next. Workers
/// exit once the queue is closed.
pub struct ThreadPool {
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Start `size` workers that hand every popped task to `handler`
    ///
    /// The handler receives the index of the worker running it. A panic in
    /// the handler is logged and the worker moves on to the next task.
    pub fn spawn<T, F>(size: usize, queue: Arc<WorkQueue<T>>, handler: F) -> io::Result<Self>
    where
        T: Send + 'static,
        F: Fn(usize, T) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let worker_queue = queue.clone();
            let handler = handler.clone();
            let worker = thread::Builder::new()
                .name(format!("rtdoc-worker-{index}"))
                .spawn(move || {
                    debug!("Worker {} started", index);
                    while let Some(task) = worker_queue.pop() {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(index, task)));
                        if outcome.is_err() {
                            error!("Worker {} recovered from a panicking task", index);
                        }
                    }
                    debug!("Worker {} stopped", index);
                });

            match worker {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    queue.close();
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self { workers })
    }

    /// Number of workers in the pool
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit
    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                error!("Worker thread terminated abnormally");
            }
        }
    }
}
