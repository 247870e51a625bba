//! Cancellable background jobs.

use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    task::JoinSet,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Handle to a single scheduled job.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    token: CancellationToken,
}

impl ScheduledTask {
    /// Cancel this job only. A job already running finishes its current pass.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the job was cancelled, directly or by scheduler shutdown.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owner of all background timers of a coordinator.
///
/// `shutdown` cancels every outstanding job and waits for them to exit.
pub struct Scheduler {
    token: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler with no jobs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Run `job` every `period`, first firing one period from now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_interval<F, Fut>(&self, name: &'static str, period: Duration, mut job: F) -> ScheduledTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.child_token();
        let cancelled = token.clone();
        let first = Instant::now() + period;

        self.spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => job().await,
                }
            }
            tracing::debug!(job = name, "interval job stopped");
        });

        ScheduledTask { token }
    }

    /// Run `job` once after `delay` unless cancelled first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_after<Fut>(&self, name: &'static str, delay: Duration, job: Fut) -> ScheduledTask
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.child_token();
        let cancelled = token.clone();
        let deadline = Instant::now() + delay;

        self.spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {
                    tracing::debug!(job = name, "deferred job cancelled");
                }
                () = tokio::time::sleep_until(deadline) => job.await,
            }
        });

        ScheduledTask { token }
    }

    fn spawn<Fut>(&self, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // reap finished jobs so the set does not grow without bound
        while tasks.try_join_next().is_some() {}
        if self.token.is_cancelled() {
            tracing::debug!("scheduler shut down, dropping job");
            return;
        }
        tasks.spawn(fut);
    }

    /// Number of jobs not yet reaped.
    #[must_use]
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel all jobs and wait for them to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    tracing::error!("scheduled job panicked: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_after_fires() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        scheduler.spawn_after("once", Duration::from_secs(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_secs(9)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_job_never_fires() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = scheduler.spawn_after("once", Duration::from_secs(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();

        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_runs_until_shutdown() {
        let scheduler = Scheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        scheduler.spawn_interval("tick", Duration::from_secs(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(5)).await;
            settle().await;
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        scheduler.shutdown().await;
        assert!(scheduler.is_shut_down());
        assert_eq!(scheduler.pending(), 0);

        tokio::time::advance(Duration::from_secs(50)).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadlines_count_from_scheduling_time() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let once = Arc::clone(&fired);
        scheduler.spawn_after("once", Duration::from_secs(10), async move {
            once.fetch_add(1, Ordering::SeqCst);
        });
        let ticks = Arc::clone(&fired);
        scheduler.spawn_interval("tick", Duration::from_secs(10), move || {
            let ticks = Arc::clone(&ticks);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        // the clock moves before either job is first polled
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_is_dropped() {
        let scheduler = Scheduler::new();
        tokio_test::assert_ready!(tokio_test::task::spawn(scheduler.shutdown()).poll());
        let handle = scheduler.spawn_after("late", Duration::from_millis(1), async {});
        assert!(handle.is_cancelled());
        assert_eq!(scheduler.pending(), 0);
        scheduler.shutdown().await;
    }
}
