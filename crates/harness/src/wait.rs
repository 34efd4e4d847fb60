//! Bounded waiting and retry primitives
//!
//! Every suspension in the harness goes through a [`Deadline`] or a
//! [`RetryPolicy`]; there is no unbounded wait and no fixed settle sleep.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::browser::BrowserError;

/// A poll loop ceiling.
#[derive(Debug, Clone)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
    interval: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration, interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout,
            // A zero interval would spin
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.start.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep one poll interval, clamped to the time left.
    ///
    /// Returns `false` once the deadline has passed, in which case the caller
    /// has already made its last observation.
    pub async fn tick(&self) -> bool {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return false;
        }
        sleep(self.interval.min(remaining)).await;
        true
    }
}

/// Why a bounded wait gave up.
#[derive(Debug, Clone)]
pub enum WaitError {
    /// The condition was never observed; carries the last observed state.
    TimedOut { waited: Duration, last: String },
    /// More than one control matched where exactly one was required.
    Ambiguous { count: usize },
    /// The browser failed in a way polling cannot recover from.
    Fatal(BrowserError),
}

impl std::fmt::Display for WaitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitError::TimedOut { waited, last } => {
                write!(f, "not observed within {} ms (last: {})", waited.as_millis(), last)
            }
            WaitError::Ambiguous { count } => write!(f, "{count} controls match"),
            WaitError::Fatal(e) => write!(f, "{e}"),
        }
    }
}

/// One observation made by [`poll_until`].
#[derive(Debug)]
pub enum Probe<T> {
    Ready(T),
    /// Not there yet; describes what was observed instead
    Pending(String),
    Failed(BrowserError),
}

/// Re-run `probe` every `interval` until it is ready or `timeout` elapses.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe<T>>,
{
    let deadline = Deadline::after(timeout, interval);
    loop {
        match probe().await {
            Probe::Ready(value) => return Ok(value),
            Probe::Failed(e) => return Err(WaitError::Fatal(e)),
            Probe::Pending(last) => {
                if !deadline.tick().await {
                    return Err(WaitError::TimedOut {
                        waited: deadline.elapsed(),
                        last,
                    });
                }
            }
        }
    }
}

/// Bounded-time retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total time after which no new attempt is started
    pub budget: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            multiplier: 2,
        }
    }

    pub fn start(&self) -> Retry {
        Retry {
            policy: self.clone(),
            started: Instant::now(),
            next_backoff: self.initial_backoff,
            attempt: 1,
        }
    }
}

/// Progress through one [`RetryPolicy`].
#[derive(Debug)]
pub struct Retry {
    policy: RetryPolicy,
    started: Instant,
    next_backoff: Duration,
    attempt: u32,
}

impl Retry {
    /// 1-based number of the attempt in progress.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Wait before the next attempt. Returns `false` when the budget does not
    /// leave room for the backoff, meaning the caller should give up.
    pub async fn backoff(&mut self) -> bool {
        let spent = self.started.elapsed();
        if spent + self.next_backoff >= self.policy.budget {
            return false;
        }
        sleep(self.next_backoff).await;
        self.next_backoff = (self.next_backoff * self.policy.multiplier.max(1))
            .min(self.policy.max_backoff);
        self.attempt += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ticks_until_timeout() {
        let deadline = Deadline::after(Duration::from_millis(350), Duration::from_millis(100));
        let mut ticks = 0;
        while deadline.tick().await {
            ticks += 1;
        }
        // 100, 200, 300, then a clamped 50
        assert_eq!(ticks, 4);
        assert!(deadline.elapsed() >= Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_respects_budget() {
        let policy = RetryPolicy {
            budget: Duration::from_secs(2),
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(1),
            multiplier: 2,
        };
        let mut retry = policy.start();
        let mut attempts = 1;
        while retry.backoff().await {
            attempts += 1;
        }
        // Backoffs of 250, 500 and 1000 ms fit; the next 1000 ms would overrun
        assert_eq!(attempts, 4);
        assert_eq!(retry.attempt(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_returns_first_ready_value() {
        let start = Instant::now();
        let value = poll_until(Duration::from_secs(5), Duration::from_millis(100), || async move {
            if start.elapsed() >= Duration::from_millis(300) {
                Probe::Ready(start.elapsed())
            } else {
                Probe::Pending("starting".to_string())
            }
        })
        .await
        .unwrap();
        assert_eq!(value, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_reports_last_observation() {
        let err = poll_until(Duration::from_secs(1), Duration::from_millis(100), || async move {
            Probe::<()>::Pending("503 Service Unavailable".to_string())
        })
        .await
        .unwrap_err();
        match err {
            WaitError::TimedOut { waited, last } => {
                assert_eq!(waited, Duration::from_secs(1));
                assert_eq!(last, "503 Service Unavailable");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_wait_error_display() {
        let err = WaitError::TimedOut {
            waited: Duration::from_millis(1500),
            last: "0 matches".into(),
        };
        assert_eq!(err.to_string(), "not observed within 1500 ms (last: 0 matches)");
    }
}
