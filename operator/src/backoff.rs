//! Per-key exponential backoff with jitter.
//!
//! Every failed or not-yet-ready reconcile of a key doubles its delay, up to a
//! cap. A key that settles starts over from the initial delay. A key that
//! has not failed for a few maximum delays is forgotten, which covers objects
//! deleted while backing off: those are never reconciled again to be reset.
use crate::ReconcileKey;
use rand::Rng;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Idle time, in maximum delays, after which a key's failures are dropped
const STALE_AFTER_MAX_DELAYS: u32 = 4;

#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

#[derive(Default)]
pub struct Backoff {
    config: BackoffConfig,
    /// failures so far and time of the last one
    attempts: Mutex<HashMap<ReconcileKey, (u32, Instant)>>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: Mutex::default(),
        }
    }

    /// Delay before the next attempt for `key`, counting this failure
    pub fn next(&self, key: &ReconcileKey) -> Duration {
        self.next_at(key, Instant::now())
    }

    fn next_at(&self, key: &ReconcileKey, now: Instant) -> Duration {
        let stale = self.config.max_delay * STALE_AFTER_MAX_DELAYS;
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
            attempts.retain(|_, (_, last)| now.saturating_duration_since(*last) <= stale);
            let (n, last) = attempts.entry(key.clone()).or_insert((0, now));
            let current = *n;
            *n = n.saturating_add(1);
            *last = now;
            current
        };
        self.delay(attempt)
    }

    /// Forget the failures of a key that settled
    pub fn reset(&self, key: &ReconcileKey) {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(attempt.min(64) as i32);
        let capped = base.min(self.config.max_delay.as_secs_f64());
        // 50-150% of the nominal delay
        let jitter = rand::rng().random_range(0.5..1.5);
        Duration::from_secs_f64((capped * jitter).min(self.config.max_delay.as_secs_f64()))
    }
}
