use std::fmt::Debug;
use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tracing::warn;

use crate::error::ConfigError;
use crate::error::PolicyError;
use crate::keys::CATCH_ALL_KEY;
use crate::metrics::MetricsSink;

use super::Throttler;

/// Deadline applied to each remote rate check unless configured otherwise.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_millis(100);

/// Client for a remote rate checking service.
///
/// The transport and wire protocol belong to the implementation.
pub trait RateCheckClient: Send + Sync + Debug {
    /// Ask `endpoint` whether `key` is over its limit, counting this request.
    ///
    /// Implementations should give up once `timeout` has elapsed. The caller
    /// stops waiting at that point either way.
    ///
    /// # Errors
    ///
    /// Any transport or service failure.
    fn is_over_limit(&self, endpoint: &str, key: &str, timeout: Duration) -> Result<bool, PolicyError>;
}

/// Delegates decisions to a shared, remote rate checking service.
///
/// The catch-all key is never sent, so one global remote cap cannot dominate
/// traffic. Each call runs on its own thread and the caller waits at most the
/// configured timeout for it. Remote failures and late answers are logged and
/// count as "not throttled".
#[derive(Debug, Clone)]
pub struct DistributedThrottler {
    endpoint: String,
    timeout: Duration,
    client: Arc<dyn RateCheckClient>,
}

impl DistributedThrottler {
    /// # Errors
    ///
    /// Fails if `endpoint` is empty.
    pub fn new(endpoint: impl Into<String>, client: Arc<dyn RateCheckClient>) -> Result<Self, ConfigError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(ConfigError::Empty("endpoint"));
        }
        Ok(Self {
            endpoint,
            timeout: DEFAULT_REMOTE_TIMEOUT,
            client,
        })
    }

    /// Set the deadline for each remote call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn check(&self, key: &str, metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        let start = Instant::now();
        let result = self.ask(key);
        metrics.add_time("RemoteRateCheckTime", start.elapsed());
        result
    }

    fn ask(&self, key: &str) -> Result<bool, PolicyError> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let client = Arc::clone(&self.client);
        let endpoint = self.endpoint.clone();
        let key = key.to_owned();
        let timeout = self.timeout;

        thread::Builder::new()
            .name("remote-rate-check".to_string())
            .spawn(move || {
                // The receiver is gone once the caller stopped waiting.
                let _ = sender.send(client.is_over_limit(&endpoint, &key, timeout));
            })
            .map_err(|error| self.remote_error(error.to_string()))?;

        match receiver.recv_timeout(self.timeout) {
            Ok(answer) => answer,
            Err(RecvTimeoutError::Timeout) => Err(PolicyError::Timeout {
                endpoint: self.endpoint.clone(),
                timeout: self.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(self.remote_error("rate check client gave no answer".to_string()))
            }
        }
    }

    fn remote_error(&self, reason: String) -> PolicyError {
        PolicyError::Remote {
            endpoint: self.endpoint.clone(),
            reason,
        }
    }
}

impl Throttler for DistributedThrottler {
    fn is_throttled(&self, key: &str, metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        if key == CATCH_ALL_KEY {
            return Ok(false);
        }

        match self.check(key, metrics) {
            Ok(throttled) => Ok(throttled),
            Err(error) => {
                metrics.add_count("RemoteRateCheckFailure", 1);
                warn!(%error, key, "remote rate check failed; not throttling");
                Ok(false)
            }
        }
    }
}
