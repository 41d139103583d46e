use std::fmt::Debug;
use std::sync::Arc;

use crate::error::PolicyError;
use crate::metrics::MetricsSink;

mod composite;
mod distributed;
mod legacy;
mod list;
mod local;

pub use composite::CompositeThrottler;
pub use distributed::DEFAULT_REMOTE_TIMEOUT;
pub use distributed::DistributedThrottler;
pub use distributed::RateCheckClient;
pub use legacy::LegacyAdapter;
pub use list::ListMode;
pub use list::StaticThrottler;
pub use local::LocalThrottler;

/// The core trait for all throttling policies.
///
/// Throttlers must be `Send` and `Sync` so a single instance can serve every
/// in-flight request via `Arc`.
pub trait Throttler: Send + Sync + Debug {
    /// Decide whether `key` is over its limit.
    ///
    /// Asking counts the request against `key` for rate based policies, so a
    /// caller must ask at most once per key per decision. See [`crate::Memoizer`].
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` if the policy could not be evaluated. Callers treat
    /// that as "not throttled".
    fn is_throttled(&self, key: &str, metrics: &dyn MetricsSink) -> Result<bool, PolicyError>;
}

impl<T> Throttler for Arc<T>
where
    T: Throttler + ?Sized,
{
    fn is_throttled(&self, key: &str, metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        (**self).is_throttled(key, metrics)
    }
}

/// Never throttles. Used for shadow or dry-run evaluation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpThrottler;

impl Throttler for NoOpThrottler {
    fn is_throttled(&self, _key: &str, _metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        Ok(false)
    }
}
