use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;

use crate::error::ConfigError;
use crate::error::PolicyError;
use crate::metrics::MetricsSink;

use super::Throttler;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct RateState {
    limit: f64,
    window_reset: Instant,
    count: u64,
}

/// An in-process, per-key fixed window limiter.
///
/// Each configured key owns a one second window guarded by its own lock, so
/// unrelated keys never contend. Keys without a configured limit, the
/// catch-all key included, are never throttled and never counted.
#[derive(Debug)]
pub struct LocalThrottler {
    states: HashMap<String, Mutex<RateState>>,
    clock: Clock,
}

impl LocalThrottler {
    /// Creates a `LocalThrottler` from `(key, requests per second)` pairs.
    ///
    /// # Errors
    ///
    /// Fails if a limit is negative or NaN. A limit of `0` throttles every request.
    pub fn new<I, K>(limits: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self::with_clock(limits, Clock::new())
    }

    /// As [`LocalThrottler::new`], reading time from `clock`.
    pub fn with_clock<I, K>(limits: I, clock: Clock) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let now = clock.now();
        let mut states = HashMap::new();
        for (key, limit) in limits {
            let key = key.into();
            if limit.is_nan() || limit < 0.0 {
                return Err(ConfigError::InvalidLimit { key, limit });
            }
            states.insert(
                key,
                Mutex::new(RateState {
                    limit,
                    window_reset: now,
                    count: 0,
                }),
            );
        }
        Ok(Self { states, clock })
    }

    /// The configured limit for `key`, if any.
    pub fn limit(&self, key: &str) -> Option<f64> {
        self.states
            .get(key)
            .and_then(|state| state.lock().ok().map(|s| s.limit))
    }
}

impl Throttler for LocalThrottler {
    fn is_throttled(&self, key: &str, _metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        let Some(state) = self.states.get(key) else {
            return Ok(false);
        };

        let now = self.clock.now();
        let mut state = state
            .lock()
            .map_err(|_| PolicyError::Throttler(format!("rate state for {key:?} is poisoned")))?;

        if now >= state.window_reset {
            state.count = 0;
            state.window_reset = now + WINDOW;
        }
        state.count += 1;

        let rate = state.count as f64 / WINDOW.as_secs_f64();
        Ok(rate > state.limit)
    }
}
