//! Cooperative Task Executors
//!
//! The stack runs on a set of single-threaded task queues bound to
//! dedicated threads: one control executor per DU, one cell executor per
//! cell and one tunnel executor per GTP-U bearer group. Tasks submitted
//! to an executor run serially in FIFO order; submission is non-blocking
//! and reports a full queue to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Unit of work posted to an executor
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable submission handle for one worker's queue
#[derive(Clone)]
pub struct TaskExecutor {
    name: Arc<str>,
    queue: mpsc::Sender<Task>,
}

impl TaskExecutor {
    /// Enqueue a task for execution. Returns `false` if the queue is
    /// full; the task is dropped in that case.
    pub fn execute(&self, task: Task) -> bool {
        self.queue.try_send(task).is_ok()
    }

    /// Alias of [`execute`](Self::execute) used at deferral call sites.
    pub fn defer(&self, task: Task) -> bool {
        self.execute(task)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A pinned worker thread draining a bounded FIFO task queue.
pub struct TaskWorker {
    name: Arc<str>,
    queue: mpsc::Sender<Task>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TaskWorker {
    /// Spawn a worker thread with a queue of `queue_capacity` tasks.
    pub fn new(name: &str, queue_capacity: usize) -> Self {
        let name: Arc<str> = Arc::from(name);
        let (tx, mut rx) = mpsc::channel::<Task>(queue_capacity);
        let stop_flag = Arc::new(AtomicBool::new(false));

        let thread_name = name.clone();
        let thread_stop = stop_flag.clone();
        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                debug!("Task worker '{}' started", thread_name);
                while let Some(task) = rx.blocking_recv() {
                    task();
                    if thread_stop.load(Ordering::Acquire) {
                        // Drain whatever was enqueued before the stop.
                        while let Ok(task) = rx.try_recv() {
                            task();
                        }
                        break;
                    }
                }
                debug!("Task worker '{}' stopped", thread_name);
            })
            .unwrap_or_else(|e| panic!("Failed to spawn task worker '{}': {}", name, e));

        Self {
            name,
            queue: tx,
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Create a submission handle for this worker's queue.
    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            name: self.name.clone(),
            queue: self.queue.clone(),
        }
    }

    /// Request the worker to finish its queued tasks and join it.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop_flag.store(true, Ordering::Release);
        // Wake the worker in case the queue is empty. A full queue means
        // there is already a task that will observe the flag.
        let _ = self.queue.try_send(Box::new(|| {}));
        if handle.join().is_err() {
            error!("Task worker '{}' panicked", self.name);
        }
    }
}

impl Drop for TaskWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;

    #[test]
    fn test_tasks_run_in_fifo_order() {
        let mut worker = TaskWorker::new("test_fifo", 16);
        let exec = worker.executor();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = std_mpsc::channel();

        for i in 0..8 {
            let order = order.clone();
            let done_tx = done_tx.clone();
            assert!(exec.execute(Box::new(move || {
                order.lock().unwrap().push(i);
                if i == 7 {
                    done_tx.send(()).unwrap();
                }
            })));
        }

        done_rx.recv().unwrap();
        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
        worker.stop();
    }

    #[test]
    fn test_queue_full_is_reported() {
        let mut worker = TaskWorker::new("test_full", 1);
        let exec = worker.executor();
        let (started_tx, started_rx) = std_mpsc::channel();
        let (block_tx, block_rx) = std_mpsc::channel::<()>();

        // Occupy the worker so queued tasks pile up.
        assert!(exec.execute(Box::new(move || {
            started_tx.send(()).unwrap();
            block_rx.recv().unwrap();
        })));
        started_rx.recv().unwrap();

        // One slot in the queue, then full.
        assert!(exec.execute(Box::new(|| {})));
        assert!(!exec.execute(Box::new(|| {})));

        block_tx.send(()).unwrap();
        worker.stop();
    }

    #[test]
    fn test_stop_runs_pending_tasks() {
        let mut worker = TaskWorker::new("test_stop", 16);
        let exec = worker.executor();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        assert!(exec.execute(Box::new(move || {
            flag.store(true, Ordering::Release);
        })));
        worker.stop();
        assert!(ran.load(Ordering::Acquire));
    }
}
