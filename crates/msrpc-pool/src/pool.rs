use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{PoolError, Result};
use crate::worker::{self, Task, TaskSender, WorkerSlot};

/// How long a worker may sit idle before the sweeper stops it (3 seconds).
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(3);

/// Callback receiving the payload of a panicking task.
pub type PanicHandler = Arc<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

/// Worker pool configuration.
///
/// # Default Configuration
///
/// - `capacity`: 64
/// - `expiry`: 3 seconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of live worker threads
    pub capacity: usize,
    /// Idle time after which a worker is stopped
    pub expiry: Duration,
}

impl PoolConfig {
    pub fn new(capacity: usize, expiry: Duration) -> Self {
        Self { capacity, expiry }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(64, DEFAULT_EXPIRY)
    }
}

/// State guarded by the pool mutex.
struct PoolState {
    /// Worker arena, never longer than `capacity`.
    slots: Vec<WorkerSlot>,
    /// Indices of slots whose thread has exited.
    free_slots: Vec<usize>,
    /// Idle worker indices, least recently used first.
    idle: VecDeque<usize>,
}

pub(crate) struct Inner {
    capacity: usize,
    expiry: Duration,
    /// Live worker threads. Only changed while holding `state`.
    running: AtomicUsize,
    closed: AtomicBool,
    state: Mutex<PoolState>,
    available: Condvar,
    panic_handler: Mutex<Option<PanicHandler>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pops an idle worker, starts a new one if under capacity, or parks
    /// until either becomes possible.
    fn get_worker(self: &Arc<Self>) -> Result<TaskSender> {
        let mut state = self.lock();
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(PoolError::Closed);
            }

            if let Some(index) = state.idle.pop_back() {
                if let Some(sender) = state.slots[index].sender.clone() {
                    return Ok(sender);
                }
                continue;
            }

            if self.running.load(Ordering::Acquire) < self.capacity {
                return self.spawn_worker(&mut state);
            }

            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn spawn_worker(self: &Arc<Self>, state: &mut PoolState) -> Result<TaskSender> {
        let (sender, receiver) = mpsc::sync_channel::<Option<Task>>(1);

        let index = match state.free_slots.pop() {
            Some(index) => {
                state.slots[index] = WorkerSlot::new(sender.clone());
                index
            }
            None => {
                state.slots.push(WorkerSlot::new(sender.clone()));
                state.slots.len() - 1
            }
        };

        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("msrpc-worker-{}", index))
            .spawn(move || worker::run(inner, index, receiver));

        match spawned {
            Ok(_) => {
                self.running.fetch_add(1, Ordering::AcqRel);
                Ok(sender)
            }
            Err(e) => {
                state.slots[index].sender = None;
                state.free_slots.push(index);
                Err(PoolError::Spawn(e.to_string()))
            }
        }
    }

    /// Returns a worker to the idle list. `false` tells the worker to exit.
    pub(crate) fn put_worker(&self, index: usize) -> bool {
        let mut state = self.lock();
        if self.closed.load(Ordering::Acquire) {
            state.slots[index].sender = None;
            return false;
        }
        state.slots[index].last_active = Instant::now();
        state.idle.push_back(index);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Bookkeeping for a worker thread that is about to return.
    pub(crate) fn worker_exited(&self, index: usize) {
        let mut state = self.lock();
        state.slots[index].sender = None;
        state.free_slots.push(index);
        self.running.fetch_sub(1, Ordering::AcqRel);
        drop(state);
        self.available.notify_all();
    }

    pub(crate) fn handle_panic(&self, payload: Box<dyn Any + Send>) {
        let handler = self
            .panic_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => handler(payload),
            None => tracing::error!("Worker task panicked: {}", panic_message(payload.as_ref())),
        }
    }

    /// Stops idle workers whose last activity is older than the expiry.
    fn expire_idle(&self) {
        let mut state = self.lock();
        let now = Instant::now();
        let mut expired = 0;

        while let Some(&index) = state.idle.front() {
            if now.duration_since(state.slots[index].last_active) <= self.expiry {
                break;
            }
            state.idle.pop_front();
            state.slots[index].stop();
            expired += 1;
        }

        if expired > 0 {
            tracing::debug!("Expired {} idle workers", expired);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Background thread that expires idle workers every `expiry`.
struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    fn start(inner: Arc<Inner>) -> Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("msrpc-pool-sweeper".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(inner.expiry) {
                    Err(RecvTimeoutError::Timeout) => inner.expire_idle(),
                    _ => break,
                }
            })
            .map_err(|e| PoolError::Spawn(e.to_string()))?;
        Ok(Self { stop, handle })
    }

    fn shutdown(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            tracing::error!("Pool sweeper thread panicked");
        }
    }
}

/// Bounded pool of reusable worker threads.
///
/// Tasks are closures run on OS threads. At most `capacity` worker threads
/// exist at once; `submit` blocks while all of them are busy. Workers idle
/// for longer than the expiry are stopped by a background sweeper.
///
/// # Accounting
///
/// [`running`](Self::running) counts live worker threads, busy or idle.
/// It goes up when a thread starts and down when that thread exits (idle
/// expiry, release, or refusal by a closed pool), so `running() <= capacity()`
/// and `free() == capacity() - running()` hold at every observation.
///
/// # Example
///
/// ```
/// use msrpc_pool::Pool;
/// use std::sync::mpsc;
///
/// let pool = Pool::with_capacity(4).unwrap();
/// let (tx, rx) = mpsc::channel();
/// pool.submit(move || tx.send(21 * 2).unwrap()).unwrap();
/// assert_eq!(rx.recv().unwrap(), 42);
///
/// pool.release();
/// assert!(pool.submit(|| ()).is_err());
/// ```
pub struct Pool {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl Pool {
    /// Creates a pool and starts its sweeper.
    ///
    /// # Errors
    ///
    /// - `InvalidCapacity` if `capacity` is 0
    /// - `InvalidExpiry` if `expiry` is zero
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }
        if config.expiry.is_zero() {
            return Err(PoolError::InvalidExpiry);
        }

        let inner = Arc::new(Inner {
            capacity: config.capacity,
            expiry: config.expiry,
            running: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            state: Mutex::new(PoolState {
                slots: Vec::with_capacity(config.capacity),
                free_slots: Vec::new(),
                idle: VecDeque::with_capacity(config.capacity),
            }),
            available: Condvar::new(),
            panic_handler: Mutex::new(None),
        });

        let sweeper = Sweeper::start(Arc::clone(&inner))?;
        Ok(Self {
            inner,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Creates a pool with the default expiry.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::new(PoolConfig::new(capacity, DEFAULT_EXPIRY))
    }

    /// Installs the callback for panicking tasks. Without one, panics are
    /// logged.
    pub fn set_panic_handler<F>(&self, handler: F)
    where
        F: Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
    {
        *self
            .inner
            .panic_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Runs `task` on a pooled worker.
    ///
    /// Blocks while every worker is busy and the pool is at capacity.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Closed` if the pool has been released, including
    /// while this call was waiting for a worker.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.inner.get_worker()?;
        sender
            .send(Some(Box::new(task)))
            .map_err(|_| PoolError::Closed)
    }

    /// Live worker threads.
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Workers that could still be started.
    pub fn free(&self) -> usize {
        self.inner.capacity.saturating_sub(self.running())
    }

    /// Workers parked waiting for a task.
    pub fn idle(&self) -> usize {
        self.inner.lock().idle.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn expiry(&self) -> Duration {
        self.inner.expiry
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes the pool.
    ///
    /// Idle workers are stopped, waiting submitters fail with `Closed`, and
    /// busy workers exit once their current task returns. In-flight tasks are
    /// not interrupted. Calling this again is a no-op.
    pub fn release(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        {
            let mut state = self.inner.lock();
            while let Some(index) = state.idle.pop_front() {
                state.slots[index].stop();
            }
        }
        self.inner.available.notify_all();

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown();
        }
        tracing::debug!("Pool released");
    }

    /// Reopens a released pool.
    ///
    /// Returns `false` if the pool was not closed.
    pub fn restart(&self) -> Result<bool> {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.inner.closed.load(Ordering::Acquire) {
            return Ok(false);
        }

        if let Some(stale) = sweeper.take() {
            stale.shutdown();
        }
        *sweeper = Some(Sweeper::start(Arc::clone(&self.inner))?);
        self.inner.closed.store(false, Ordering::Release);
        tracing::debug!("Pool restarted");
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn allocated_slots(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.inner.capacity)
            .field("running", &self.running())
            .field("expiry", &self.inner.expiry)
            .field("closed", &self.is_closed())
            .finish()
    }
}
