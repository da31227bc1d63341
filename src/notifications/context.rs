//! Execution contexts that notification callbacks run on.

use crate::error::Result;
use crossbeam_channel::{bounded, unbounded, Sender};
use std::fmt;
use std::thread::{self, JoinHandle};

/// A unit of work handed to an execution context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where a subscription's callbacks run.
///
/// Implementations must run jobs one at a time in submission order; the
/// registrar relies on this for per-subscription ordering.
pub trait ExecutionContext: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs each job inline on the thread that delivers the notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl ExecutionContext for Immediate {
    fn execute(&self, job: Job) {
        job()
    }
}

/// A serial queue backed by one worker thread.
///
/// Dropping the queue runs the jobs already submitted and then joins the
/// worker.
pub struct SerialQueue {
    label: String,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl SerialQueue {
    /// Spawn a new queue.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let (sender, receiver) = unbounded::<Job>();

        let worker = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })?;

        Ok(Self {
            label,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Block until every job submitted before this call has run.
    pub fn flush(&self) {
        let (done, wait) = bounded::<()>(1);
        self.execute(Box::new(move || {
            let _ = done.send(());
        }));
        let _ = wait.recv();
    }
}

impl ExecutionContext for SerialQueue {
    fn execute(&self, job: Job) {
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                tracing::warn!(queue = %self.label, "serial queue worker is gone; job dropped");
            }
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!(queue = %self.label, "serial queue worker panicked");
            }
        }
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_immediate_runs_inline() {
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        Immediate.execute(Box::new(move || *flag.lock() = true));
        assert!(*ran.lock());
    }

    #[test]
    fn test_serial_queue_preserves_order() {
        let queue = SerialQueue::new("test-queue").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            queue.execute(Box::new(move || seen.lock().push(i)));
        }
        queue.flush();

        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
        assert_eq!(queue.label(), "test-queue");
    }

    #[test]
    fn test_serial_queue_runs_on_worker_thread() {
        let queue = SerialQueue::new("worker").unwrap();
        let name = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&name);
        queue.execute(Box::new(move || {
            *slot.lock() = thread::current().name().map(str::to_string);
        }));
        drop(queue);
        assert_eq!(name.lock().as_deref(), Some("worker"));
    }
}
