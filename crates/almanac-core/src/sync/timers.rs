//! Cancellable one-shot and repeating timers on the tokio clock
//!
//! Everything runs on `tokio::time`, so a test with a paused clock drives the
//! timers with `tokio::time::advance`. Deadlines are fixed when a timer is
//! scheduled, not when its task is first polled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Identifies a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl Registry {
    fn tasks(&self) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner of every timer it schedules; dropping it does not cancel them, `cancel_all` does.
#[derive(Clone, Default)]
pub struct Timers {
    registry: Arc<Registry>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `delay`
    pub fn schedule_after<F>(&self, delay: Duration, task: F) -> TimerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = time::Instant::now() + delay;
        let registry = Arc::downgrade(&self.registry);
        // Holding the lock across spawn keeps the task from finishing before it is registered
        let mut tasks = self.registry.tasks();
        let join = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            // Once fired, cancelling no longer aborts the running task
            if let Some(registry) = registry.upgrade() {
                registry.tasks().remove(&id);
            }
            task.await;
        });
        tasks.insert(id, join);
        TimerHandle(id)
    }

    /// Run `tick` every `period`, first after one full period
    pub fn schedule_every<F, Fut>(&self, period: Duration, mut tick: F) -> TimerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let start = time::Instant::now() + period;
        let join = tokio::spawn(async move {
            let mut interval = time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });
        self.registry.tasks().insert(id, join);
        TimerHandle(id)
    }

    /// Stop a timer; `false` when it already fired or was cancelled
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        self.registry.tasks().remove(&handle.0).is_some_and(|join| {
            join.abort();
            true
        })
    }

    pub fn cancel_all(&self) {
        for (_, join) in self.registry.tasks().drain() {
            join.abort();
        }
    }

    /// Timers that have neither fired (one-shot) nor been cancelled
    pub fn active(&self) -> usize {
        self.registry.tasks().len()
    }
}
