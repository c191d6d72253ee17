//! Test helpers shared by this crate and `model_deploy_lambda`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::wait::Clock;

/// Clock whose `sleep` advances virtual time instantly.
///
/// [`ManualClock::cancel_at`] raises a flag when a sleep starts at or after a
/// given virtual time, mimicking a deadline watch firing mid-wait.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
    cancel_trigger: Option<(Duration, Arc<AtomicBool>)>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
            cancel_trigger: None,
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_at(mut self, at: Duration, cancel: Arc<AtomicBool>) -> Self {
        self.cancel_trigger = Some((at, cancel));
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("poisoned mutex").clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().expect("poisoned mutex")
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().expect("poisoned mutex");
        if let Some((at, cancel)) = &self.cancel_trigger {
            if *elapsed >= *at {
                cancel.store(true, Ordering::Relaxed);
            }
        }
        *elapsed += duration;
        self.sleeps.lock().expect("poisoned mutex").push(duration);
    }
}
