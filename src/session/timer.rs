//! Cancellable timers on the tokio clock
//!
//! Both types are owned by the lifecycle worker and polled from its select
//! loop, so "at most one pending timer per slot" holds by construction:
//! arming a slot replaces its deadline, and an unarmed slot never fires.

use std::future;
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// One-shot deadline
#[derive(Debug)]
pub(crate) struct TimerSlot {
    name: &'static str,
    deadline: Option<Instant>,
}

impl TimerSlot {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            deadline: None,
        }
    }

    /// Arm the slot `delay` from now, replacing any previous deadline
    pub(crate) fn arm(&mut self, delay: Duration) {
        log::debug!("Arming {} timer in {}s", self.name, delay.as_secs());
        self.deadline = Some(Instant::now() + delay);
    }

    /// Disarm the slot; a no-op on a fired or already cancelled slot
    ///
    /// Returns whether a pending deadline was actually cancelled.
    pub(crate) fn cancel(&mut self) -> bool {
        let cancelled = self.deadline.take().is_some();
        if cancelled {
            log::debug!("Cancelled {} timer", self.name);
        }
        cancelled
    }

    #[cfg(test)]
    pub(crate) const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolve once the deadline passes, disarming the slot
    ///
    /// Cancel safe: dropping the future before it resolves leaves the slot armed.
    pub(crate) async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => future::pending().await,
        }
    }
}

/// Repeating tick that only exists while started
#[derive(Debug)]
pub(crate) struct Ticker {
    period: Duration,
    interval: Option<Interval>,
}

impl Ticker {
    pub(crate) const fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Start ticking; the first tick arrives after `first_delay`
    ///
    /// Restarting an already running ticker resets its phase. Missed ticks are
    /// delayed rather than delivered in a burst.
    pub(crate) fn start(&mut self, first_delay: Duration) {
        let mut interval = time::interval_at(Instant::now() + first_delay, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Stop ticking; idempotent
    pub(crate) fn stop(&mut self) -> bool {
        self.interval.take().is_some()
    }

    pub(crate) const fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub(crate) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The tokio timer rounds deadlines up to whole milliseconds
    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed <= expected + Duration::from_millis(5),
            "expected ~{expected:?}, got {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_slot_fires_at_deadline() {
        let mut slot = TimerSlot::new("test");
        let start = Instant::now();
        slot.arm(Duration::from_secs(60));
        assert!(slot.is_armed());

        slot.fired().await;

        assert_elapsed(start, Duration::from_secs(60));
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_slot_rearm_replaces_deadline() {
        let mut slot = TimerSlot::new("test");
        let start = Instant::now();
        slot.arm(Duration::from_secs(60));
        slot.arm(Duration::from_secs(5));

        slot.fired().await;
        assert_elapsed(start, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_slot_never_fires() {
        let mut slot = TimerSlot::new("test");
        slot.arm(Duration::from_secs(1));
        assert!(slot.cancel());
        assert!(!slot.cancel());

        let fired = time::timeout(Duration::from_secs(3600), slot.fired()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_fired_future_keeps_slot_armed() {
        let mut slot = TimerSlot::new("test");
        slot.arm(Duration::from_secs(10));

        let early = time::timeout(Duration::from_secs(1), slot.fired()).await;
        assert!(early.is_err());
        assert!(slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_period_and_stop() {
        let mut ticker = Ticker::new(Duration::from_secs(1));
        assert!(!ticker.is_running());

        let start = Instant::now();
        ticker.start(Duration::from_secs(1));
        ticker.tick().await;
        ticker.tick().await;
        assert_elapsed(start, Duration::from_secs(2));

        assert!(ticker.stop());
        assert!(!ticker.stop());
        let ticked = time::timeout(Duration::from_secs(10), ticker.tick()).await;
        assert!(ticked.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_immediate_first_tick() {
        let mut ticker = Ticker::new(Duration::from_secs(30));
        let start = Instant::now();
        ticker.start(Duration::ZERO);

        ticker.tick().await;
        assert_elapsed(start, Duration::ZERO);

        ticker.tick().await;
        assert_elapsed(start, Duration::from_secs(30));
    }
}
