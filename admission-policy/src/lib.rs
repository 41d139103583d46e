//! # admission-policy
//!
//! `admission-policy` decides whether a request should be admitted. It holds the
//! pieces a throttling or load shedding handler is assembled from:
//!
//! * **[`KeyGenerator`]**: derives bucket keys (`"aws-account:123"`,
//!   `"Operation:Svc/Op"`) from a [`RequestContext`], composable through
//!   cartesian products and prefixes.
//! * **[`Throttler`]**: a policy answering "is this key over its limit?".
//!   Implementations include an in-process fixed window ([`LocalThrottler`]),
//!   a remote service client ([`DistributedThrottler`]), deny and allow lists,
//!   and a logical OR over several throttlers.
//! * **[`Memoizer`]**: guarantees a throttler is asked at most once per key per
//!   request, even when several handlers evaluate the same request.
//!
//! Everything here is synchronous and runs to completion on the calling thread.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use admission_policy::KeyGenerator;
//! use admission_policy::LocalThrottler;
//! use admission_policy::Memoizer;
//! use admission_policy::RequestContext;
//! use admission_policy::ACCOUNT_ID;
//!
//! let throttler = LocalThrottler::new([("aws-account:123", 100.0)]).unwrap();
//! let memoizer = Memoizer::new(Arc::new(throttler));
//!
//! let ctx = RequestContext::new().with_identity(ACCOUNT_ID, "123");
//! for key in KeyGenerator::default_identity().keys(&ctx).unwrap() {
//!     if memoizer.is_throttled(&key, &ctx).unwrap() {
//!         // Reject the request
//!     }
//! }
//! ```

mod context;
mod diagnostics;
mod error;
mod in_flight;
mod keys;
mod memoizer;
mod metrics;
mod throttler;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;

pub use context::ACCESS_KEY;
pub use context::ACCOUNT_ID;
pub use context::DEFAULT_IDENTITY_ATTRIBUTES;
pub use context::REMOTE_ADDRESS;
pub use context::RequestContext;
pub use diagnostics::Diagnostics;
pub use diagnostics::Warning;
pub use error::ConfigError;
pub use error::PolicyError;
pub use in_flight::InFlightGauge;
pub use in_flight::InFlightGuard;
pub use keys::CATCH_ALL_KEY;
pub use keys::KeyGenerator;
pub use keys::KeySource;
pub use memoizer::MemoCache;
pub use memoizer::Memoizer;
pub use metrics::MetricsSink;
pub use metrics::NoopMetrics;
pub use metrics::Recorded;
pub use metrics::RecordingMetrics;
pub use throttler::CompositeThrottler;
pub use throttler::DEFAULT_REMOTE_TIMEOUT;
pub use throttler::DistributedThrottler;
pub use throttler::LegacyAdapter;
pub use throttler::ListMode;
pub use throttler::LocalThrottler;
pub use throttler::NoOpThrottler;
pub use throttler::RateCheckClient;
pub use throttler::StaticThrottler;
pub use throttler::Throttler;
