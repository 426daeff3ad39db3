//! Idle scheduler — defers non-critical work so it never competes with the
//! caller's own work.
//!
//! ```text
//! schedule(task) ──► [FIFO queue] ──► Idle:   worker: yield_now()   ──► task()
//!                                 └─► Timer:  worker: sleep(delay)  ──► task()
//!                                 └─► Thread: worker: sleep(delay)  ──► task()   (no runtime)
//! ```
//!
//! Every strategy has exactly one consumer, so tasks run one at a time in
//! submission order. The idle worker yields to every other ready task on the
//! runtime before running each unit of work; the timer worker waits a minimal
//! delay instead. Without a tokio runtime the timer worker runs on a
//! dedicated thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use storefront_core::config::{SchedulerConfig, SchedulerMode};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Completion bookkeeping shared with the worker. Kept apart from the
/// sender so dropping the last scheduler handle stops the worker.
#[derive(Default)]
struct TaskCounter {
    outstanding: AtomicUsize,
    drained: Notify,
}

struct SchedulerInner {
    sender: mpsc::UnboundedSender<Task>,
    /// Resolved mode, never `Auto`.
    mode: SchedulerMode,
    counter: Arc<TaskCounter>,
}

/// Cheap-clone handle to a scheduler.
#[derive(Clone)]
pub struct IdleScheduler {
    inner: Arc<SchedulerInner>,
}

impl IdleScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        let runtime = Handle::try_current().ok();
        let mode = match (config.mode, &runtime) {
            (SchedulerMode::Auto, Some(_)) | (SchedulerMode::Idle, Some(_)) => SchedulerMode::Idle,
            (SchedulerMode::Idle, None) => {
                warn!("idle scheduling requested without a tokio runtime, using timer");
                SchedulerMode::Timer
            }
            _ => SchedulerMode::Timer,
        };

        let delay = Duration::from_millis(config.timer_delay_ms);
        let counter = Arc::new(TaskCounter::default());
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker_counter = Arc::clone(&counter);

        match (mode, runtime) {
            (SchedulerMode::Idle, Some(handle)) => {
                handle.spawn(idle_worker(receiver, worker_counter));
            }
            (_, Some(handle)) => {
                handle.spawn(timer_worker(receiver, worker_counter, delay));
            }
            (_, None) => {
                let spawned = std::thread::Builder::new()
                    .name("tracking-scheduler".into())
                    .spawn(move || thread_worker(receiver, worker_counter, delay));
                if let Err(e) = spawned {
                    warn!(error = %e, "failed to start scheduler thread, tasks will run inline");
                }
            }
        }
        debug!(?mode, "scheduler started");

        Self {
            inner: Arc::new(SchedulerInner {
                sender,
                mode,
                counter,
            }),
        }
    }

    /// Whether tasks go through the idle worker rather than the timer.
    pub fn is_idle_mode(&self) -> bool {
        self.inner.mode == SchedulerMode::Idle
    }

    /// Queue `task` for a single best-effort run.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.counter.outstanding.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(task)) = self.inner.sender.send(Box::new(task)) {
            // Worker is gone (runtime shut down): keep order by running now.
            debug!("scheduler worker gone, running task inline");
            run_task(&self.inner.counter, task);
        }
    }

    /// Number of scheduled tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.inner.counter.outstanding.load(Ordering::SeqCst)
    }

    /// Wait until every scheduled task, including tasks scheduled by tasks,
    /// has run.
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.counter.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn idle_worker(mut receiver: mpsc::UnboundedReceiver<Task>, counter: Arc<TaskCounter>) {
    while let Some(task) = receiver.recv().await {
        tokio::task::yield_now().await;
        run_task(&counter, task);
    }
    debug!("idle scheduler stopped");
}

async fn timer_worker(
    mut receiver: mpsc::UnboundedReceiver<Task>,
    counter: Arc<TaskCounter>,
    delay: Duration,
) {
    while let Some(task) = receiver.recv().await {
        tokio::time::sleep(delay).await;
        run_task(&counter, task);
    }
    debug!("timer scheduler stopped");
}

fn thread_worker(
    mut receiver: mpsc::UnboundedReceiver<Task>,
    counter: Arc<TaskCounter>,
    delay: Duration,
) {
    while let Some(task) = receiver.blocking_recv() {
        std::thread::sleep(delay);
        run_task(&counter, task);
    }
    debug!("scheduler thread stopped");
}

fn run_task(counter: &TaskCounter, task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        metrics::counter!("tracking.task_panics").increment(1);
        warn!("scheduled tracking task panicked");
    }
    if counter.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
        counter.drained.notify_waiters();
    }
}
