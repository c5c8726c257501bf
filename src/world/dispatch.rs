//! Deferred notification dispatch.
//!
//! Hooks never run inside the call that caused them. Each node keeps a small
//! FIFO of pending callbacks ([`TaskQueue`]); the first callback queued on an
//! idle node hands a "drain one" job to the shared [`Dispatch`] sink, and each
//! drain job resubmits itself while the node still has work. Callbacks for
//! one node therefore run one at a time in the order they were queued, while
//! different nodes proceed in parallel on the pool.

use std::collections::VecDeque;
use std::fmt;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use super::errors::WorldError;
use super::World;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A queued notification for one node.
pub(crate) type Callback = Box<dyn FnOnce(&World) + Send + 'static>;

/// A task the sink refused; it is handed back so the caller can run it.
pub struct Rejected(pub Task);

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rejected(..)")
    }
}

/// FIFO-capable executor. The engine only requires that tasks it submits run
/// eventually; per-node ordering is handled above this trait.
pub trait Dispatch: Send + Sync + 'static {
    fn enqueue(&self, task: Task) -> Result<(), Rejected>;
}

/// Fixed set of named worker threads fed by an unbounded channel. Workers
/// exit once the pool is dropped and the channel drains.
pub struct WorkerPool {
    sender: Sender<Task>,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize, name_prefix: &str) -> Result<Self, WorldError> {
        let threads = threads.max(1);
        let (sender, receiver) = unbounded::<Task>();
        for i in 0..threads {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("{}-{}", name_prefix, i))
                .spawn(move || Self::worker_loop(receiver))
                .map_err(|e| WorldError::Dispatch(format!("failed to spawn dispatch worker: {}", e)))?;
        }
        debug!(target: "dispatch", "started {} dispatch workers", threads);
        Ok(WorkerPool { sender, threads })
    }

    fn worker_loop(receiver: Receiver<Task>) {
        while let Ok(task) = receiver.recv() {
            task();
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Dispatch for WorkerPool {
    fn enqueue(&self, task: Task) -> Result<(), Rejected> {
        self.sender.send(task).map_err(|e| Rejected(e.into_inner()))
    }
}

/// Runs every task immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatch;

impl Dispatch for InlineDispatch {
    fn enqueue(&self, task: Task) -> Result<(), Rejected> {
        task();
        Ok(())
    }
}

/// Per-node callback queue.
#[derive(Default)]
pub(crate) struct TaskQueue {
    pending: VecDeque<Callback>,
    running: bool,
}

impl TaskQueue {
    /// Queue `callback`. True if the queue was idle and the caller must submit a
    /// drain job.
    pub(crate) fn push(&mut self, callback: Callback) -> bool {
        self.pending.push_back(callback);
        if self.running {
            false
        } else {
            self.running = true;
            true
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Callback> {
        self.pending.pop_front()
    }

    /// Called after a task ran. True if more work is waiting; otherwise the
    /// queue goes idle.
    pub(crate) fn has_more(&mut self) -> bool {
        if self.pending.is_empty() {
            self.running = false;
            false
        } else {
            true
        }
    }
}

/// Count of queued-but-unfinished callbacks, waitable until zero.
#[derive(Default)]
pub(crate) struct Outstanding {
    count: Mutex<u64>,
    idle: Condvar,
}

impl Outstanding {
    pub(crate) fn begin(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn end(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub(crate) fn wait_idle(&self, stall: Duration) {
        let mut count = self.count.lock();
        while *count > 0 {
            if self.idle.wait_for(&mut count, stall).timed_out() {
                warn!(
                    target: "concurrency",
                    "still waiting on {} notification tasks after {:?}",
                    *count,
                    stall
                );
            }
        }
    }

    /// False if `timeout` expired first.
    pub(crate) fn wait_idle_for(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}
