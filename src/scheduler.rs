//! Scheduler for lifecycle scan/install jobs.
//! Admits a bounded number of deduplicated tasks into active execution,
//! hands them to the external job runner, and reclaims capacity as jobs
//! finish or time out.
//!
//! Task flow is one-way: overflow queue -> hot queue -> active tracker ->
//! gone. A key is present in at most one of the three structures at any
//! instant. All queue-shape transitions go through a single scheduling
//! loop; all admission decisions are serialized by one coarse lock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::hot_queue::HotQueue;
use crate::overflow::OverflowQueue;
use crate::runner::{JobRunner, JobSubmission};
use crate::task::{LifecycleTarget, Task};
use crate::tracker::ActiveJobTracker;

// ============================================================================
// Types
// ============================================================================

/// Result of a schedule request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The key is already pending or active; a legitimate retry of an
    /// in-flight request, acknowledged without re-admission.
    Scheduled,
    /// Newly admitted into the hot or overflow queue.
    Success,
    /// Both queues full; the caller decides whether to retry later.
    Failure,
}

/// Construction-time sizing for the scheduler. No hot-reload path.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Worker count; also sizes the hot queue and the active tracker.
    pub worker_count: usize,
    /// Overflow queue capacity.
    pub overflow_capacity: usize,
    /// Safety-net TTL for jobs that never report completion.
    pub active_job_ttl: Duration,
    /// Interval of the tracker's background expiry sweep.
    pub sweep_interval: Duration,
}

impl From<&Config> for SchedulerOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            worker_count: cfg.worker_count,
            overflow_capacity: cfg.overflow_capacity,
            active_job_ttl: cfg.active_job_ttl(),
            sweep_interval: cfg.sweep_interval(),
        }
    }
}

/// Snapshot of queue and tracker sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub hot: usize,
    pub overflow: usize,
    pub active: usize,
}

/// Both pending queues, guarded together: this mutex is the admission lock
/// that linearizes `schedule` calls and hot-to-active promotion.
struct Queues<T> {
    hot: HotQueue<T>,
    overflow: OverflowQueue<T>,
}

struct Shared<T, R> {
    queues: Mutex<Queues<T>>,
    tracker: Arc<ActiveJobTracker<T>>,
    runner: Arc<R>,
    /// Capacity-available notifications for idle workers. Bounded at the
    /// worker count and published with `try_send`: a dropped token only
    /// happens when every worker already has a pending wake.
    wake_tx: mpsc::Sender<()>,
    wake_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    worker_count: usize,
}

// ============================================================================
// Scheduler facade
// ============================================================================

pub struct Scheduler<T, R> {
    shared: Arc<Shared<T, R>>,
    shutdown_tx: watch::Sender<bool>,
    sweep_interval: Duration,
    /// Taken by the scheduling loop on `start`.
    freed_rx: Mutex<Option<mpsc::Receiver<Uuid>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T, R> Scheduler<T, R>
where
    T: LifecycleTarget,
    R: JobRunner<T> + 'static,
{
    pub fn new(options: SchedulerOptions, runner: Arc<R>) -> Arc<Self> {
        let (wake_tx, wake_rx) = mpsc::channel(options.worker_count.max(1));
        let (freed_tx, freed_rx) = mpsc::channel(options.worker_count.max(1));

        // Single release path for every eviction cause: explicit forget,
        // submission failure, TTL expiry. The tracker removes an entry
        // exactly once, so a slot's release is never double-counted.
        let tracker = ActiveJobTracker::new(
            options.worker_count,
            options.active_job_ttl,
            Box::new(move |task: Task<T>, cause| {
                tracing::debug!(
                    key = %task.key(),
                    kind = task.kind().as_str(),
                    cause = cause.as_str(),
                    "active job slot released"
                );
                let _ = freed_tx.try_send(task.key());
            }),
        );

        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues {
                hot: HotQueue::new(options.worker_count),
                overflow: OverflowQueue::new(options.overflow_capacity),
            }),
            tracker,
            runner,
            wake_tx,
            wake_rx: tokio::sync::Mutex::new(wake_rx),
            worker_count: options.worker_count,
        });

        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            shared,
            shutdown_tx,
            sweep_interval: options.sweep_interval,
            freed_rx: Mutex::new(Some(freed_rx)),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Admit a task for execution.
    ///
    /// A key already present anywhere in the pipeline is absorbed as
    /// [`ScheduleOutcome::Scheduled`], never re-admitted: at-most-one
    /// in-flight job per key is the central invariant.
    pub fn schedule(&self, task: Task<T>) -> ScheduleOutcome {
        let key = task.key();
        let mut queues = self.shared.queues.lock().unwrap();

        if self.shared.tracker.has(&key) || queues.hot.has(&key) || queues.overflow.has(&key) {
            tracing::debug!(key = %key, "task already in flight; absorbing re-request");
            return ScheduleOutcome::Scheduled;
        }

        match queues.hot.enqueue(task) {
            Ok(()) => {
                drop(queues);
                let _ = self.shared.wake_tx.try_send(());
                ScheduleOutcome::Success
            }
            Err(task) => match queues.overflow.push(task) {
                Ok(()) => ScheduleOutcome::Success,
                Err(task) => {
                    tracing::warn!(key = %task.key(), "scheduler saturated; rejecting task");
                    ScheduleOutcome::Failure
                }
            },
        }
    }

    /// Explicit completion path, invoked once the job runner has reported
    /// success or failure for a key. No-op when the key is not active.
    /// Triggers the same capacity-freed signal as TTL expiry.
    pub fn forget_finished_job(&self, key: &Uuid) -> bool {
        self.shared.tracker.delete(key)
    }

    /// Whether a key is anywhere in the pipeline (pending or active).
    pub fn has_task(&self, key: &Uuid) -> bool {
        let queues = self.shared.queues.lock().unwrap();
        self.shared.tracker.has(key) || queues.hot.has(key) || queues.overflow.has(key)
    }

    pub fn stats(&self) -> SchedulerStats {
        let queues = self.shared.queues.lock().unwrap();
        SchedulerStats {
            hot: queues.hot.len(),
            overflow: queues.overflow.len(),
            active: self.shared.tracker.len(),
        }
    }

    /// Spawn the worker pool, the scheduling loop, and the tracker's expiry
    /// sweep. Must run inside a tokio runtime. Idempotent: a second call
    /// logs a warning and does nothing.
    pub fn start(&self) {
        let Some(freed_rx) = self.freed_rx.lock().unwrap().take() else {
            tracing::warn!("scheduler already started");
            return;
        };

        let mut handles = self.handles.lock().unwrap();

        handles.push(
            self.shared
                .tracker
                .spawn_sweeper(self.sweep_interval, self.shutdown_tx.subscribe()),
        );

        handles.push(tokio::spawn(run_scheduling_loop(
            Arc::clone(&self.shared),
            freed_rx,
            self.shutdown_tx.subscribe(),
        )));

        for worker_id in 0..self.shared.worker_count {
            handles.push(tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&self.shared),
                self.shutdown_tx.subscribe(),
            )));
        }

        tracing::info!(
            workers = self.shared.worker_count,
            "scheduler started"
        );
    }

    /// Signal shutdown and wait for workers, the scheduling loop, and the
    /// expiry sweep to exit. In-flight external jobs are not cancelled;
    /// only scheduler bookkeeping is torn down.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("scheduler stopped");
    }
}

// ============================================================================
// Worker pool
// ============================================================================

/// One of `W` concurrent executors. Waits for a capacity-available
/// notification, promotes tasks hot queue -> tracker under the admission
/// lock, and hands them to the job runner fire-and-forget.
async fn run_worker<T, R>(
    worker_id: usize,
    shared: Arc<Shared<T, R>>,
    mut shutdown: watch::Receiver<bool>,
) where
    T: LifecycleTarget,
    R: JobRunner<T>,
{
    loop {
        // Workers share one receiver behind a mutex; whoever holds it waits
        // for the next wake token. Never held across a submission.
        {
            let mut wake_rx = shared.wake_rx.lock().await;
            tokio::select! {
                _ = shutdown.changed() => break,
                token = wake_rx.recv() => {
                    if token.is_none() {
                        break;
                    }
                }
            }
        }

        // Drain as much as tracker capacity allows; spurious wakes are fine.
        loop {
            if *shutdown.borrow() {
                return;
            }
            let Some(task) = claim_next(&shared) else {
                break;
            };
            submit(&shared, worker_id, task).await;
        }
    }
    tracing::debug!(worker_id, "worker exited");
}

/// Promote the oldest hot-queue task into the active tracker, holding the
/// admission lock so no `schedule` call can observe a membership gap.
fn claim_next<T, R>(shared: &Shared<T, R>) -> Option<Task<T>>
where
    T: LifecycleTarget,
{
    let mut queues = shared.queues.lock().unwrap();
    if shared.tracker.len() >= shared.tracker.capacity() {
        return None;
    }
    let task = queues.hot.dequeue()?;
    shared.tracker.set(task.clone());
    Some(task)
}

/// Submission is fire-and-forget: completion is observed only via the
/// explicit forget path or TTL expiry. A failed submission reclaims the
/// tracker slot immediately; re-submission is the caller's responsibility.
async fn submit<T, R>(shared: &Shared<T, R>, worker_id: usize, task: Task<T>)
where
    T: LifecycleTarget,
    R: JobRunner<T>,
{
    match shared.runner.ensure_job(&task).await {
        Ok(JobSubmission::Created) => {
            tracing::info!(
                worker_id,
                key = %task.key(),
                kind = task.kind().as_str(),
                target = %task.target().object_ref(),
                "job created"
            );
        }
        Ok(JobSubmission::Existing(phase)) => {
            tracing::debug!(
                worker_id,
                key = %task.key(),
                ?phase,
                "job already exists; inspected"
            );
        }
        Err(err) => {
            tracing::warn!(
                worker_id,
                key = %task.key(),
                kind = task.kind().as_str(),
                "job submission failed, dropping task: {err:?}"
            );
            shared.tracker.delete(&task.key());
        }
    }
}

// ============================================================================
// Scheduling loop
// ============================================================================

/// Single control task serializing all queue-shape transitions. Wakes on
/// each capacity-freed signal, refills the hot queue from overflow, and
/// re-arms workers.
async fn run_scheduling_loop<T, R>(
    shared: Arc<Shared<T, R>>,
    mut freed_rx: mpsc::Receiver<Uuid>,
    mut shutdown: watch::Receiver<bool>,
) where
    T: LifecycleTarget,
{
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            freed = freed_rx.recv() => {
                match freed {
                    Some(key) => rebalance(&shared, key),
                    None => break,
                }
            }
        }
    }

    let (hot, overflow) = {
        let queues = shared.queues.lock().unwrap();
        (queues.hot.len(), queues.overflow.len())
    };
    tracing::info!(
        hot,
        overflow,
        active = shared.tracker.len(),
        "scheduling loop stopped"
    );
}

/// Rebalance after a capacity-freed signal.
///
/// Free tracker room is computed here, at signal-handling time, so the slot
/// released by the very eviction that raised the signal is always counted,
/// even when the hot queue and the tracker were both full a moment earlier.
fn rebalance<T, R>(shared: &Shared<T, R>, freed_key: Uuid)
where
    T: LifecycleTarget,
{
    let mut queues = shared.queues.lock().unwrap();

    if queues.hot.is_empty() && queues.overflow.is_empty() {
        return;
    }

    let room = shared
        .tracker
        .capacity()
        .saturating_sub(shared.tracker.len());
    if room == 0 {
        tracing::debug!(freed = %freed_key, "tracker still at capacity; nothing to rebalance");
        return;
    }

    // A full hot queue means idle workers may be parked without a pending
    // wake; hand out one token per free tracker slot so they drain it.
    if queues.hot.is_full() {
        for _ in 0..room {
            let _ = shared.wake_tx.try_send(());
        }
    }

    let mut promoted = 0usize;
    while !queues.hot.is_full() {
        let Some(task) = queues.overflow.pop() else {
            break;
        };
        let enqueued = queues.hot.enqueue(task);
        debug_assert!(enqueued.is_ok(), "hot queue refused enqueue below capacity");
        promoted += 1;
    }

    // Guarantee at least one worker wakes even if none were idle when the
    // signal fired.
    if !queues.hot.is_empty() {
        let _ = shared.wake_tx.try_send(());
    }

    tracing::debug!(
        freed = %freed_key,
        promoted,
        room,
        hot = queues.hot.len(),
        overflow = queues.overflow.len(),
        "rebalanced queues"
    );
}
