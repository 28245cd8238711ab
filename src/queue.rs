//! Serial dispatch queues.
//!
//! The coordinator runs camera I/O on one queue and delegate callbacks
//! on another. Jobs execute one at a time, in submission order, on a
//! dedicated worker thread.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::trace;

type Job = Box<dyn FnOnce() + Send>;

struct Gate {
    suspended: Mutex<bool>,
    resumed: Condvar,
}

/// A serial dispatch queue.
///
/// Handles are cheap to clone and share one worker. The worker drains
/// remaining jobs and exits once the last handle is dropped.
#[derive(Clone)]
pub struct SerialQueue {
    tx: Sender<Job>,
    gate: Arc<Gate>,
    label: &'static str,
}

impl SerialQueue {
    /// Spawn a queue whose worker thread carries `label` as its name.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let gate = Arc::new(Gate {
            suspended: Mutex::new(false),
            resumed: Condvar::new(),
        });

        let worker_gate = Arc::clone(&gate);
        thread::Builder::new()
            .name(label.to_owned())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let mut suspended = worker_gate.suspended.lock();
                    while *suspended {
                        worker_gate.resumed.wait(&mut suspended);
                    }
                    drop(suspended);
                    job();
                }
            })
            .expect("failed to spawn queue worker");

        Self { tx, gate, label }
    }

    /// Enqueue `job` and return immediately.
    ///
    /// Jobs submitted during teardown are dropped, matching
    /// fire-and-forget semantics.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(job));
    }

    /// Run `job` on the queue and block until it completes.
    ///
    /// Must not be called from the queue's own worker, and not while
    /// the queue is suspended; both would deadlock.
    pub fn dispatch_sync<R, F>(&self, job: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.dispatch(move || {
            let _ = done_tx.send(job());
        });
        done_rx
            .recv()
            .expect("queue worker exited before sync job completed")
    }

    /// Defer execution of queued and future jobs until [`resume`](Self::resume).
    ///
    /// A job already executing is not interrupted.
    pub fn suspend(&self) {
        *self.gate.suspended.lock() = true;
        trace!(queue = self.label, "suspended");
    }

    /// Re-enable job execution.
    pub fn resume(&self) {
        let mut suspended = self.gate.suspended.lock();
        *suspended = false;
        self.gate.resumed.notify_one();
        trace!(queue = self.label, "resumed");
    }
}
