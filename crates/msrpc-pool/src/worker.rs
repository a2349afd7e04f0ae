use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;
use std::time::Instant;

use crate::pool::Inner;

/// Unit of work accepted by the pool.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// `None` is the stop sentinel.
pub(crate) type TaskSender = SyncSender<Option<Task>>;

/// Arena entry for one worker thread.
///
/// `sender` is `None` once the worker has been told to stop (or has
/// stopped); the slot index is recycled only after the thread exits.
pub(crate) struct WorkerSlot {
    pub(crate) sender: Option<TaskSender>,
    pub(crate) last_active: Instant,
}

impl WorkerSlot {
    pub(crate) fn new(sender: TaskSender) -> Self {
        Self {
            sender: Some(sender),
            last_active: Instant::now(),
        }
    }

    /// Tells the worker to exit after its current task.
    pub(crate) fn stop(&mut self) {
        if let Some(sender) = self.sender.take() {
            // An idle worker's channel is empty, so this never blocks. If it
            // were full, dropping the sender still ends the worker's loop.
            let _ = sender.try_send(None);
        }
    }
}

/// Worker thread body.
///
/// Runs tasks until it receives the stop sentinel, its channel is closed, or
/// the pool refuses to take it back. A panicking task is reported and the
/// worker keeps serving.
pub(crate) fn run(inner: Arc<Inner>, index: usize, tasks: Receiver<Option<Task>>) {
    while let Ok(Some(task)) = tasks.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            inner.handle_panic(payload);
        }
        if !inner.put_worker(index) {
            break;
        }
    }
    inner.worker_exited(index);
}
