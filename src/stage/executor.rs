//! Bounded worker pool with caller-runs saturation policy.
//!
//! # Responsibilities
//! - Run submitted closures on named worker threads
//! - Bound pending work with a fixed-capacity queue
//! - Grow from `core_threads` up to `max_threads` only once the queue is full
//! - Run the work on the submitting thread when the pool is saturated
//! - Drain queued work on shutdown without cancelling anything
//!
//! # Design Decisions
//! - Workers each wait on a shared MPMC receiver with `keep_alive`, so
//!   extra workers can retire while idle
//! - The pool never holds queued work with zero live workers, even when
//!   `core_threads` is 0
//! - Each job runs under `catch_unwind`; a panic never kills a worker
//! - Saturation never drops work: latency spikes instead of losses

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::config::StageConfig;
use crate::stage::{ExecutorError, StageTask};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Point-in-time counters for one pool.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StageStats {
    pub name: String,
    pub submitted: u64,
    pub completed: u64,
    pub caller_runs: u64,
    pub workers: usize,
}

struct Shared {
    name: String,
    receiver: Receiver<Job>,
    workers: AtomicUsize,
    completed: AtomicU64,
}

/// A named, bounded pool backing one pipeline stage.
pub struct StageExecutor {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    core_threads: usize,
    max_threads: usize,
    keep_alive: Duration,
    submitted: AtomicU64,
    caller_runs: AtomicU64,
    spawned: AtomicUsize,
}

impl StageExecutor {
    /// Create a pool and spawn its core workers.
    pub fn new(name: impl Into<String>, config: &StageConfig) -> Result<Self, ExecutorError> {
        let name = name.into();
        let max_threads = config.max_threads.max(1);
        let core_threads = config.core_threads.min(max_threads);
        let (tx, rx) = channel::bounded(config.queue_capacity.max(1));

        let executor = Self {
            shared: Arc::new(Shared {
                name,
                receiver: rx,
                workers: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
            }),
            sender: Mutex::new(Some(tx)),
            handles: Mutex::new(Vec::with_capacity(max_threads)),
            core_threads,
            max_threads,
            keep_alive: Duration::from_millis(config.keep_alive_ms.max(1)),
            submitted: AtomicU64::new(0),
            caller_runs: AtomicU64::new(0),
            spawned: AtomicUsize::new(0),
        };

        for _ in 0..core_threads {
            executor.shared.workers.fetch_add(1, Ordering::SeqCst);
            executor.spawn_worker(None, true)?;
        }

        tracing::debug!(
            stage = %executor.shared.name,
            core_threads,
            max_threads,
            queue_capacity = config.queue_capacity,
            "Stage executor started"
        );

        Ok(executor)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Submit work; the returned task resolves with the closure's value.
    ///
    /// When the queue is full and no more workers may be added, `f` runs on
    /// the calling thread before this method returns.
    pub fn submit<F, T>(&self, f: F) -> Result<StageTask<T>, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // Receiver may be gone if the caller stopped waiting.
            let _ = tx.send(f());
        });

        self.execute(job)?;
        Ok(StageTask::new(rx))
    }

    /// Fire-and-forget variant of [`submit`](Self::submit).
    pub fn spawn<F>(&self, f: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Box::new(f))
    }

    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ExecutorError::Shutdown)?;

        self.submitted.fetch_add(1, Ordering::Relaxed);

        match sender.try_send(job) {
            Ok(()) => {
                // Zero core workers, or every extra worker just retired.
                if self.shared.workers.load(Ordering::SeqCst) == 0 && self.reserve_worker() {
                    self.spawn_worker(None, false)?;
                }
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                if self.reserve_worker() {
                    return self.spawn_worker(Some(job), false);
                }
                self.caller_runs.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("horizon_stage_caller_runs_total", "stage" => self.shared.name.clone())
                    .increment(1);
                tracing::debug!(stage = %self.shared.name, "Stage saturated, running on caller");
                run_job(&self.shared, job);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                self.submitted.fetch_sub(1, Ordering::Relaxed);
                Err(ExecutorError::Shutdown)
            }
        }
    }

    /// Claim a worker slot if the pool is below `max_threads`.
    fn reserve_worker(&self) -> bool {
        self.shared
            .workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_threads).then_some(n + 1)
            })
            .is_ok()
    }

    /// Spawn a worker into an already reserved slot.
    fn spawn_worker(&self, first: Option<Job>, core: bool) -> Result<(), ExecutorError> {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let keep_alive = self.keep_alive;

        let handle = thread::Builder::new()
            .name(format!("horizon-{}-{}", self.shared.name, index))
            .spawn(move || worker_loop(shared, first, core, keep_alive))
            .map_err(|e| {
                self.shared.workers.fetch_sub(1, Ordering::SeqCst);
                ExecutorError::Spawn(e.to_string())
            })?;

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Stop accepting work. Queued work still drains.
    pub fn shutdown(&self) {
        if self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            tracing::debug!(stage = %self.shared.name, "Stage executor shutting down");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop accepting work and block until every worker has drained and exited.
    pub fn shutdown_and_join(&self) {
        self.shutdown();
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!(stage = %self.shared.name, "Worker exited abnormally");
            }
        }
        tracing::debug!(stage = %self.shared.name, "Stage executor drained");
    }

    pub fn stats(&self) -> StageStats {
        StageStats {
            name: self.shared.name.clone(),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            caller_runs: self.caller_runs.load(Ordering::Relaxed),
            workers: self.shared.workers.load(Ordering::SeqCst),
        }
    }

    pub fn core_threads(&self) -> usize {
        self.core_threads
    }
}

impl Drop for StageExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("name", &self.shared.name)
            .field("core_threads", &self.core_threads)
            .field("max_threads", &self.max_threads)
            .finish()
    }
}

fn worker_loop(shared: Arc<Shared>, first: Option<Job>, core: bool, keep_alive: Duration) {
    if let Some(job) = first {
        run_job(&shared, job);
    }

    loop {
        match shared.receiver.recv_timeout(keep_alive) {
            Ok(job) => run_job(&shared, job),
            Err(RecvTimeoutError::Timeout) if core => continue,
            Err(RecvTimeoutError::Timeout) => {
                shared.workers.fetch_sub(1, Ordering::SeqCst);
                // A submitter may have seen this worker as live just before it left.
                match shared.receiver.try_recv() {
                    Ok(job) => {
                        shared.workers.fetch_add(1, Ordering::SeqCst);
                        run_job(&shared, job);
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
                }
            }
            // Drained after shutdown.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shared.workers.fetch_sub(1, Ordering::SeqCst);
}

fn run_job(shared: &Shared, job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!(stage = %shared.name, "Stage job panicked");
    }
    shared.completed.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn config(core: usize, max: usize, queue: usize) -> StageConfig {
        StageConfig {
            core_threads: core,
            max_threads: max,
            queue_capacity: queue,
            keep_alive_ms: 50,
        }
    }

    #[tokio::test]
    async fn test_submit_returns_value() {
        let executor = StageExecutor::new("test", &config(2, 2, 8)).unwrap();
        let task = executor.submit(|| 21 * 2).unwrap();
        assert_eq!(task.await.unwrap(), 42);
        executor.shutdown_and_join();
    }

    #[test]
    fn test_runs_on_worker_thread() {
        let executor = StageExecutor::new("named", &config(1, 1, 4)).unwrap();
        let mut task = executor
            .submit(|| thread::current().name().map(str::to_string))
            .unwrap();
        executor.shutdown_and_join();
        let name = task.try_take().unwrap().unwrap().unwrap();
        assert!(name.starts_with("horizon-named-"));
    }

    #[test]
    fn test_caller_runs_when_saturated() {
        let executor = StageExecutor::new("sat", &config(1, 1, 1)).unwrap();
        let gate = Arc::new(Barrier::new(2));

        // Occupy the only worker.
        let g = gate.clone();
        executor.spawn(move || {
            g.wait();
        })
        .unwrap();
        // Give the worker time to pick the job up, then fill the queue.
        thread::sleep(Duration::from_millis(50));
        executor.spawn(|| {}).unwrap();

        // Queue full, pool at max: must run right here.
        let caller = thread::current().id();
        let mut task = executor.submit(move || thread::current().id() == caller).unwrap();
        assert!(task.try_take().unwrap().unwrap());
        assert_eq!(executor.stats().caller_runs, 1);

        gate.wait();
        executor.shutdown_and_join();
        assert_eq!(executor.stats().completed, 3);
    }

    #[test]
    fn test_grows_to_max_before_caller_runs() {
        let executor = StageExecutor::new("grow", &config(1, 2, 1)).unwrap();
        let gate = Arc::new(Barrier::new(3));

        let g = gate.clone();
        executor.spawn(move || {
            g.wait();
        })
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        executor.spawn(|| {}).unwrap();

        // Queue full, one worker left to add.
        let g = gate.clone();
        executor.spawn(move || {
            g.wait();
        })
        .unwrap();

        assert_eq!(executor.stats().workers, 2);
        assert_eq!(executor.stats().caller_runs, 0);

        gate.wait();
        executor.shutdown_and_join();
    }

    #[test]
    fn test_shutdown_rejects_and_drains() {
        let executor = StageExecutor::new("drain", &config(1, 1, 16)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let c = counter.clone();
            executor
                .spawn(move || {
                    thread::sleep(Duration::from_millis(2));
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        executor.shutdown_and_join();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(matches!(executor.submit(|| ()), Err(ExecutorError::Shutdown)));
    }

    #[tokio::test]
    async fn test_panic_abandons_task_but_keeps_worker() {
        let executor = StageExecutor::new("panic", &config(1, 1, 4)).unwrap();
        let task = executor.submit(|| -> u8 { panic!("boom") }).unwrap();
        assert!(matches!(task.await, Err(ExecutorError::Abandoned)));

        let task = executor.submit(|| 7).unwrap();
        assert_eq!(task.await.unwrap(), 7);
        executor.shutdown_and_join();
    }

    #[tokio::test]
    async fn test_zero_core_pool_still_runs_work() {
        let executor = StageExecutor::new("zero", &config(0, 4, 16)).unwrap();
        assert_eq!(executor.stats().workers, 0);

        let task = executor.submit(|| 7).unwrap();
        let value = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("queued work never ran")
            .unwrap();
        assert_eq!(value, 7);

        // The extra worker retires, and later work still runs.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(executor.stats().workers, 0);
        let task = executor.submit(|| 8).unwrap();
        let value = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("work after retirement never ran")
            .unwrap();
        assert_eq!(value, 8);
        executor.shutdown_and_join();
    }

    #[test]
    fn test_extra_worker_retires_while_core_worker_waits() {
        let executor = StageExecutor::new("retire", &config(1, 2, 1)).unwrap();
        let gate = Arc::new(Barrier::new(3));

        let g = gate.clone();
        executor.spawn(move || {
            g.wait();
        })
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        executor.spawn(|| {}).unwrap();
        let g = gate.clone();
        executor.spawn(move || {
            g.wait();
        })
        .unwrap();
        assert_eq!(executor.stats().workers, 2);

        gate.wait();
        // keep_alive is 50ms; the core worker keeps polling the whole time.
        thread::sleep(Duration::from_millis(400));
        assert_eq!(executor.stats().workers, 1);
        executor.shutdown_and_join();
    }
}
