use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::Result;

type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

struct Job {
    label: String,
    task: Task,
}

/// Counters reported when the worker shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub executed: usize,
    pub failed: usize,
}

/// One background thread draining a FIFO queue of persistence tasks.
///
/// `enqueue` never waits for disk. A failing (or panicking) task is logged
/// and counted; the worker moves on to the next one. `shutdown` closes the
/// queue and blocks until every queued task has run. Dropping the worker
/// does the same.
pub struct PersistenceWorker {
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl PersistenceWorker {
    pub fn start() -> PersistenceWorker {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = thread::spawn(move || {
            let mut stats = WorkerStats::default();
            for job in rx {
                debug!(task = %job.label, "persistence task started");
                let outcome = panic::catch_unwind(AssertUnwindSafe(job.task));
                stats.executed += 1;
                match outcome {
                    Ok(Ok(())) => debug!(task = %job.label, "persistence task done"),
                    Ok(Err(e)) => {
                        stats.failed += 1;
                        error!(task = %job.label, error = %e, "persistence task failed");
                    }
                    Err(_) => {
                        stats.failed += 1;
                        error!(task = %job.label, "persistence task panicked");
                    }
                }
            }
            stats
        });
        PersistenceWorker { tx: Some(tx), handle: Some(handle) }
    }

    /// Queues `task` behind everything already enqueued.
    pub fn enqueue<F>(&self, label: impl Into<String>, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let job = Job { label: label.into(), task: Box::new(task) };
        match &self.tx {
            Some(tx) => {
                if let Err(mpsc::SendError(job)) = tx.send(job) {
                    error!(task = %job.label, "persistence worker is gone; task dropped");
                }
            }
            None => error!(task = %job.label, "persistence worker already shut down; task dropped"),
        }
    }

    /// Blocks until the queue is drained and the thread has exited.
    pub fn shutdown(mut self) -> WorkerStats {
        self.join()
    }

    fn join(&mut self) -> WorkerStats {
        drop(self.tx.take());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("persistence worker thread panicked");
                WorkerStats::default()
            }),
            None => WorkerStats::default(),
        }
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    #[test]
    fn tasks_run_in_fifo_order_before_shutdown_returns() {
        let worker = PersistenceWorker::start();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let log = log.clone();
            worker.enqueue(format!("task {}", i), move || {
                log.lock().unwrap().push(i);
                Ok(())
            });
        }
        let stats = worker.shutdown();
        assert_eq!(*log.lock().unwrap(), (0..20).collect::<Vec<_>>());
        assert_eq!(stats, WorkerStats { executed: 20, failed: 0 });
    }

    #[test]
    fn enqueue_does_not_wait_for_slow_tasks() {
        let worker = PersistenceWorker::start();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        worker.enqueue("blocked", move || {
            release_rx.recv_timeout(Duration::from_secs(10)).ok();
            Ok(())
        });
        let t = Instant::now();
        for _ in 0..10 {
            worker.enqueue("quick", || Ok(()));
        }
        assert!(t.elapsed() < Duration::from_secs(1));
        release_tx.send(()).unwrap();
        assert_eq!(worker.shutdown().executed, 11);
    }

    #[test]
    fn failures_and_panics_do_not_stop_the_worker() {
        let worker = PersistenceWorker::start();
        let ran = Arc::new(Mutex::new(false));
        worker.enqueue("io", || Err(TrainError::InvalidConfig("disk full".into())));
        worker.enqueue("panic", || panic!("boom"));
        let flag = ran.clone();
        worker.enqueue("after", move || {
            *flag.lock().unwrap() = true;
            Ok(())
        });
        let stats = worker.shutdown();
        assert!(*ran.lock().unwrap());
        assert_eq!(stats, WorkerStats { executed: 3, failed: 2 });
    }

    #[test]
    fn drop_drains_the_queue() {
        let log = Arc::new(Mutex::new(0));
        {
            let worker = PersistenceWorker::start();
            let log = log.clone();
            worker.enqueue("count", move || {
                thread::sleep(Duration::from_millis(20));
                *log.lock().unwrap() += 1;
                Ok(())
            });
        }
        assert_eq!(*log.lock().unwrap(), 1);
    }
}
