use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;
use opentelemetry::metrics::Meter;

use admission_policy::MetricsSink;

/// Records handler metrics as OpenTelemetry instruments.
///
/// Counts become `u64` counters and times become histograms in seconds. A
/// property becomes a counter incremented by one and tagged with the value as a
/// `value` attribute, so rejected keys can be broken down per key. Instruments
/// are created on first use and reused afterwards.
#[derive(Debug)]
pub struct OtelMetrics {
    meter: Meter,
    attributes: Vec<KeyValue>,
    counters: Mutex<HashMap<String, Counter<u64>>>,
    histograms: Mutex<HashMap<String, Histogram<f64>>>,
}

impl Default for OtelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OtelMetrics {
    /// Record through the global meter provider.
    pub fn new() -> Self {
        Self::with_meter(global::meter("tower_admission"))
    }

    pub fn with_meter(meter: Meter) -> Self {
        Self {
            meter,
            attributes: Vec::new(),
            counters: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
        }
    }

    /// Attach `attributes` to every measurement.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    fn counter(&self, name: &str) -> Counter<u64> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters
            .entry(name.to_owned())
            .or_insert_with(|| self.meter.u64_counter(name.to_owned()).build())
            .clone()
    }

    fn histogram(&self, name: &str) -> Histogram<f64> {
        let mut histograms = self
            .histograms
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        histograms
            .entry(name.to_owned())
            .or_insert_with(|| {
                self.meter
                    .f64_histogram(name.to_owned())
                    .with_unit("s")
                    .build()
            })
            .clone()
    }
}

impl MetricsSink for OtelMetrics {
    fn add_count(&self, name: &str, value: u64) {
        self.counter(name).add(value, &self.attributes);
    }

    fn add_time(&self, name: &str, elapsed: Duration) {
        self.histogram(name)
            .record(elapsed.as_secs_f64(), &self.attributes);
    }

    fn add_property(&self, name: &str, value: &str) {
        let mut attributes = self.attributes.clone();
        attributes.push(KeyValue::new("value", value.to_owned()));
        self.counter(name).add(1, &attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_reuses_instruments() {
        let metrics = OtelMetrics::new().with_attributes([KeyValue::new("handler", "test")]);

        metrics.add_count("Throttle", 1);
        metrics.add_count("Throttle", 0);
        metrics.add_property("ThrottledKey", "aws-account:1");
        metrics.add_time("ThrottleTime", Duration::from_micros(3));

        assert_eq!(metrics.counters.lock().unwrap().len(), 2);
        assert_eq!(metrics.histograms.lock().unwrap().len(), 1);
    }
}
