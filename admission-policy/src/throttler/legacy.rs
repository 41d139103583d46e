use std::fmt;

use crate::error::PolicyError;
use crate::metrics::MetricsSink;

use super::Throttler;

/// Bridges a single argument decision function into a [`Throttler`].
///
/// The metrics sink is not passed on.
pub struct LegacyAdapter<F> {
    decide: F,
}

impl<F> LegacyAdapter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    pub fn new(decide: F) -> Self {
        Self { decide }
    }
}

impl<F> fmt::Debug for LegacyAdapter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyAdapter").finish_non_exhaustive()
    }
}

impl<F> Throttler for LegacyAdapter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_throttled(&self, key: &str, _metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        Ok((self.decide)(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;

    #[test]
    fn it_forwards_the_key() {
        let adapter = LegacyAdapter::new(|key: &str| key.starts_with("aws-account:"));

        assert!(adapter.is_throttled("aws-account:1", &NoopMetrics).unwrap());
        assert!(!adapter.is_throttled("remote-address:1", &NoopMetrics).unwrap());
    }
}
