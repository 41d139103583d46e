use std::fmt::Debug;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

/// Destination for per-request decision metrics.
///
/// A sink is attached to each [`crate::RequestContext`]. Handlers and throttlers
/// record into it while the request is evaluated.
pub trait MetricsSink: Send + Sync + Debug {
    /// Add `value` to the counter `name`.
    fn add_count(&self, name: &str, value: u64);

    /// Record an elapsed time under `name`.
    fn add_time(&self, name: &str, elapsed: Duration);

    /// Attach a string property to the request's metrics.
    fn add_property(&self, name: &str, value: &str);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn add_count(&self, _name: &str, _value: u64) {}

    fn add_time(&self, _name: &str, _elapsed: Duration) {}

    fn add_property(&self, _name: &str, _value: &str) {}
}

/// Everything recorded into a [`RecordingMetrics`], in arrival order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Recorded {
    pub counts: Vec<(String, u64)>,
    pub times: Vec<(String, Duration)>,
    pub properties: Vec<(String, String)>,
}

/// An in-memory sink that keeps every recording for later inspection.
///
/// Useful when the embedding pipeline flushes request metrics itself, and in tests.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    recorded: Mutex<Recorded>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sum of all values added to counter `name`, if it was ever touched.
    pub fn count(&self, name: &str) -> Option<u64> {
        let recorded = self.lock();
        recorded
            .counts
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .reduce(|a, b| a + b)
    }

    /// Every time recorded under `name`.
    pub fn times(&self, name: &str) -> Vec<Duration> {
        self.lock()
            .times
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, d)| *d)
            .collect()
    }

    /// The most recent value of property `name`.
    pub fn property(&self, name: &str) -> Option<String> {
        self.lock()
            .properties
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn snapshot(&self) -> Recorded {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsSink for RecordingMetrics {
    fn add_count(&self, name: &str, value: u64) {
        self.lock().counts.push((name.to_owned(), value));
    }

    fn add_time(&self, name: &str, elapsed: Duration) {
        self.lock().times.push((name.to_owned(), elapsed));
    }

    fn add_property(&self, name: &str, value: &str) {
        self.lock()
            .properties
            .push((name.to_owned(), value.to_owned()));
    }
}
