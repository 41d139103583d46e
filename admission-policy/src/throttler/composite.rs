use std::sync::Arc;

use tracing::warn;

use crate::error::PolicyError;
use crate::metrics::MetricsSink;

use super::Throttler;

/// Throttles when any member throttles.
///
/// Members are asked in order and evaluation stops at the first `true`, so
/// later members do not count the request. A failing member contributes no
/// signal and the next member is asked.
#[derive(Debug, Clone, Default)]
pub struct CompositeThrottler {
    members: Vec<Arc<dyn Throttler>>,
}

impl CompositeThrottler {
    pub fn new<I>(members: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Throttler>>,
    {
        Self {
            members: members.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Throttler for CompositeThrottler {
    fn is_throttled(&self, key: &str, metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        for member in &self.members {
            match member.is_throttled(key, metrics) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(error) => warn!(%error, key, ?member, "composite member failed; skipping"),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::FailingThrottler;
    use crate::mocks::TrackingThrottler;
    use crate::metrics::NoopMetrics;

    #[test]
    fn it_short_circuits_on_first_throttle() {
        let first = Arc::new(TrackingThrottler::deny(["k"]));
        let second = Arc::new(TrackingThrottler::deny(["k"]));
        let composite = CompositeThrottler::new([
            first.clone() as Arc<dyn Throttler>,
            second.clone() as Arc<dyn Throttler>,
        ]);

        assert!(composite.is_throttled("k", &NoopMetrics).unwrap());
        assert_eq!(first.calls(), vec!["k"]);
        assert!(second.calls().is_empty());
    }

    #[test]
    fn it_asks_every_member_when_clear() {
        let first = Arc::new(TrackingThrottler::deny(Vec::<String>::new()));
        let second = Arc::new(TrackingThrottler::deny(["other"]));
        let composite = CompositeThrottler::new([
            first.clone() as Arc<dyn Throttler>,
            second.clone() as Arc<dyn Throttler>,
        ]);

        assert!(!composite.is_throttled("k", &NoopMetrics).unwrap());
        assert_eq!(first.call_count("k"), 1);
        assert_eq!(second.call_count("k"), 1);
    }

    #[test]
    fn test_failing_member_is_skipped() {
        let composite = CompositeThrottler::new([
            Arc::new(FailingThrottler) as Arc<dyn Throttler>,
            Arc::new(TrackingThrottler::deny(["k"])) as Arc<dyn Throttler>,
        ]);

        assert!(composite.is_throttled("k", &NoopMetrics).unwrap());
        assert!(!composite.is_throttled("j", &NoopMetrics).unwrap());
    }

    #[test]
    fn test_empty_composite_never_throttles() {
        let composite = CompositeThrottler::default();
        assert!(composite.is_empty());
        assert!(!composite.is_throttled("k", &NoopMetrics).unwrap());
    }
}
