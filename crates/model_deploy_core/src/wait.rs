//! Bounded exponential-backoff polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(15);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
/// Longest stretch `poll_until` sleeps without looking at the cancel flag.
pub const CANCEL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl WaitPolicy {
    pub fn delays(&self) -> BackoffDelays {
        BackoffDelays {
            next: self.initial_delay.min(self.max_delay),
            max_delay: self.max_delay,
            multiplier: self.multiplier.max(1.0),
        }
    }
}

/// Endless sequence of delays: `initial, initial * m, ...` capped at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct BackoffDelays {
    next: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Iterator for BackoffDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = self.next.mul_f64(self.multiplier).min(self.max_delay);
        Some(current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("condition not met after waiting {waited:?}")]
    TimedOut { waited: Duration },
    #[error("wait cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error(transparent)]
    Wait(WaitError),
    #[error("probe failed: {0}")]
    Probe(E),
}

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Calls `probe` until it reports `true`, sleeping between attempts
/// according to `policy`. Returns the number of probes made.
///
/// `cancel` is checked before every probe and at least every
/// [`CANCEL_CHECK_INTERVAL`] while sleeping.
pub fn poll_until<E>(
    policy: &WaitPolicy,
    clock: &dyn Clock,
    cancel: &AtomicBool,
    mut probe: impl FnMut() -> Result<bool, E>,
) -> Result<u32, PollError<E>> {
    let started_at = clock.now();
    let mut delays = policy.delays();
    let mut attempts = 0u32;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(PollError::Wait(WaitError::Cancelled));
        }

        attempts += 1;
        if probe().map_err(PollError::Probe)? {
            return Ok(attempts);
        }

        let waited = clock.now().saturating_duration_since(started_at);
        if waited >= policy.timeout {
            return Err(PollError::Wait(WaitError::TimedOut { waited }));
        }

        let delay = delays
            .next()
            .unwrap_or(policy.max_delay)
            .min(policy.timeout - waited);
        sleep_unless_cancelled(clock, delay, cancel).map_err(PollError::Wait)?;
    }
}

fn sleep_unless_cancelled(
    clock: &dyn Clock,
    duration: Duration,
    cancel: &AtomicBool,
) -> Result<(), WaitError> {
    let mut remaining = duration;
    while !remaining.is_zero() {
        let slice = remaining.min(CANCEL_CHECK_INTERVAL);
        clock.sleep(slice);
        remaining -= slice;
        if cancel.load(Ordering::Relaxed) {
            return Err(WaitError::Cancelled);
        }
    }
    Ok(())
}
