//! Foreground refresh timer.
//!
//! One timeline per scheduler: `start` arms it only from `Suspended`, `stop`
//! cancels it. Each tick spawns its own refresh, so a slow refresh never
//! delays or swallows the next tick.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest period a timer will run at; smaller requests are raised to it.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Whatever a tick should resynchronize.
#[async_trait]
pub trait RefreshTarget: Send + Sync {
    async fn refresh_active(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Suspended,
}

/// Host application lifecycle transitions the scheduler follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Foreground,
    Background,
}

pub struct RefreshScheduler {
    target: Arc<dyn RefreshTarget>,
    interval: Duration,
    timer: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish()
    }
}

impl RefreshScheduler {
    /// `interval` below [`MIN_REFRESH_INTERVAL`] is raised to it.
    pub fn new(target: Arc<dyn RefreshTarget>, interval: Duration) -> Self {
        Self {
            target,
            interval: interval.max(MIN_REFRESH_INTERVAL),
            timer: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        if self.timer.lock().is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Suspended
        }
    }

    /// Arm the timer. The first tick fires one interval from now.
    ///
    /// Returns `false` (and does nothing) if already running. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let target = Arc::clone(&self.target);
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticks.tick() => {
                        tracing::trace!("refresh tick");
                        let target = Arc::clone(&target);
                        tokio::spawn(async move { target.refresh_active().await });
                    }
                }
            }

            tracing::debug!("refresh timer stopped");
        });

        *timer = Some(token);
        tracing::debug!(interval = ?self.interval, "refresh timer started");
        true
    }

    /// Cancel the timer. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        match self.timer.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Refresh right away, then arm the timer.
    pub async fn resume(&self) {
        self.target.refresh_active().await;
        self.start();
    }

    pub async fn handle_lifecycle(&self, event: Lifecycle) {
        tracing::debug!(?event, "lifecycle transition");
        match event {
            Lifecycle::Foreground => self.resume().await,
            Lifecycle::Background => {
                self.stop();
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        started: AtomicUsize,
        finished: AtomicUsize,
        work: Duration,
    }

    impl CountingTarget {
        fn slow(work: Duration) -> Arc<Self> {
            Arc::new(Self {
                work,
                ..Self::default()
            })
        }

        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshTarget for CountingTarget {
        async fn refresh_active(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    const PERIOD: Duration = Duration::from_secs(30);

    fn scheduler(target: &Arc<CountingTarget>) -> RefreshScheduler {
        RefreshScheduler::new(target.clone(), PERIOD)
    }

    #[tokio::test(start_paused = true)]
    async fn starts_suspended() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = scheduler(&target);

        assert_eq!(scheduler.state(), SchedulerState::Suspended);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(target.started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_one_timer() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = scheduler(&target);

        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert_eq!(scheduler.state(), SchedulerState::Running);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(target.started(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_suspended_is_a_no_op() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = scheduler(&target);

        assert!(!scheduler.stop());
        assert_eq!(scheduler.state(), SchedulerState::Suspended);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_ticks() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = scheduler(&target);

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(target.started(), 1);

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(target.started(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Suspended);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_runs_again() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = scheduler(&target);

        scheduler.start();
        scheduler.stop();
        assert!(scheduler.start());

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(target.started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_refreshes_immediately_then_ticks() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = scheduler(&target);

        scheduler.handle_lifecycle(Lifecycle::Foreground).await;
        assert_eq!(target.started(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Running);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(target.started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_suspends() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = scheduler(&target);

        scheduler.handle_lifecycle(Lifecycle::Foreground).await;
        scheduler.handle_lifecycle(Lifecycle::Background).await;
        assert_eq!(scheduler.state(), SchedulerState::Suspended);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(target.started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_refreshes_overlap_instead_of_blocking() {
        let target = CountingTarget::slow(Duration::from_secs(50));
        let scheduler = scheduler(&target);

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(target.started(), 3);
        assert_eq!(target.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_the_minimum() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = RefreshScheduler::new(target.clone(), Duration::ZERO);
        assert_eq!(scheduler.interval(), MIN_REFRESH_INTERVAL);

        assert!(scheduler.start());
        tokio::time::sleep(Duration::from_millis(5_500)).await;

        assert_eq!(target.started(), 5);
        assert_eq!(scheduler.state(), SchedulerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_scheduler_cancels_the_timer() {
        let target = Arc::new(CountingTarget::default());
        {
            let scheduler = scheduler(&target);
            scheduler.start();
        }

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(target.started(), 0);
    }
}
