//! Test doubles for throttlers and key sources.
//!
//! Available in this crate's tests and, for other crates, with the
//! `test-helpers` feature:
//!
//! ```toml
//! [dev-dependencies]
//! admission-policy = { version = "*", features = ["test-helpers"] }
//! ```

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::context::RequestContext;
use crate::error::PolicyError;
use crate::keys::KeySource;
use crate::metrics::MetricsSink;
use crate::throttler::Throttler;

/// A deny-list throttler that records every key it is asked about.
#[derive(Debug, Default)]
pub struct TrackingThrottler {
    deny: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl TrackingThrottler {
    /// Throttle exactly `keys`.
    pub fn deny<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            deny: keys.into_iter().map(Into::into).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every key asked about, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }
}

impl Throttler for TrackingThrottler {
    fn is_throttled(&self, key: &str, _metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_owned());
        Ok(self.deny.contains(key))
    }
}

/// A throttler that fails every evaluation.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingThrottler;

impl Throttler for FailingThrottler {
    fn is_throttled(&self, key: &str, _metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        Err(PolicyError::Throttler(format!("cannot evaluate {key:?}")))
    }
}

/// A key source that fails for every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingKeySource;

impl KeySource for FailingKeySource {
    fn keys(&self, _ctx: &RequestContext) -> Result<Vec<String>, PolicyError> {
        Err(PolicyError::KeyGeneration("identity store unavailable".to_string()))
    }
}
