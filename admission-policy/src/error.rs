use std::time::Duration;

/// Failures raised by pluggable collaborators (key generators and throttlers).
///
/// Handlers never surface these. A failed key generator contributes no keys and a
/// failed throttler contributes no signal for the key it was asked about.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    /// A key generator could not produce keys for the request.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// The remote rate check service returned an error.
    #[error("Remote rate check against {endpoint} failed: {reason}")]
    Remote {
        /// The configured endpoint of the rate check service.
        endpoint: String,
        /// The `Display` representation of the underlying failure.
        reason: String,
    },

    /// The remote rate check did not answer within its deadline.
    #[error("Remote rate check against {endpoint} exceeded {timeout:?}")]
    Timeout {
        /// The configured endpoint of the rate check service.
        endpoint: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// A throttler could not evaluate a key.
    #[error("Throttler failed: {0}")]
    Throttler(String),
}

/// Invalid configuration, reported eagerly at construction or `build()` time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A required builder field was never set.
    #[error("Missing required setting `{0}`")]
    Missing(&'static str),

    /// An argument that must carry a value was empty.
    #[error("Setting `{0}` must not be empty")]
    Empty(&'static str),

    /// Both or neither of an archetype and a custom key generator were supplied.
    #[error("Exactly one of `archetype` or `key_generator` must be set")]
    KeySelection,

    /// Both a throttler and a shared memoizer were supplied.
    #[error("Only one of `throttler` or `memoizer` may be set")]
    ThrottlerSelection,

    /// Load shedding capacity below zero.
    #[error("Capacity must not be negative, got {0}")]
    NegativeCapacity(i64),

    /// A rate limit that is negative or not a number.
    #[error("Invalid rate limit {limit} for key {key:?}")]
    InvalidLimit {
        /// The key the limit was configured for.
        key: String,
        /// The rejected limit.
        limit: f64,
    },
}
