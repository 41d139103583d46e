use std::collections::HashMap;
use std::sync::Arc;

use crate::memoizer::MemoTable;
use crate::metrics::MetricsSink;
use crate::metrics::NoopMetrics;

/// Identity attribute carrying the caller's account id.
pub const ACCOUNT_ID: &str = "aws-account";
/// Identity attribute carrying the caller's access key.
pub const ACCESS_KEY: &str = "aws-access-key";
/// Identity attribute carrying the caller's remote address.
pub const REMOTE_ADDRESS: &str = "remote-address";

/// Identity attributes used when none are configured, in key order.
pub const DEFAULT_IDENTITY_ATTRIBUTES: [&str; 3] = [ACCOUNT_ID, ACCESS_KEY, REMOTE_ADDRESS];

/// Everything the admission core needs to know about one request.
///
/// A context lives exactly as long as the request it describes. The memo table
/// it carries holds every per-request throttling decision, so dropping the
/// context discards them.
#[derive(Debug)]
pub struct RequestContext {
    identity: HashMap<String, String>,
    service_operation: Option<(String, String)>,
    in_flight: Option<u64>,
    metrics: Arc<dyn MetricsSink>,
    memo: MemoTable,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            identity: HashMap::new(),
            service_operation: None,
            in_flight: None,
            metrics: Arc::new(NoopMetrics),
            memo: MemoTable::default(),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set identity attribute `name` (see [`DEFAULT_IDENTITY_ATTRIBUTES`]).
    pub fn with_identity(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.identity.insert(name.into(), value.into());
        self
    }

    /// Set the service and operation the request is addressed to.
    pub fn with_operation(mut self, service: impl Into<String>, operation: impl Into<String>) -> Self {
        self.service_operation = Some((service.into(), operation.into()));
        self
    }

    /// Set the estimated number of requests in flight, this one included.
    pub fn with_in_flight(mut self, in_flight: u64) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn identity_attribute(&self, name: &str) -> Option<&str> {
        self.identity.get(name).map(String::as_str)
    }

    pub fn service_operation(&self) -> Option<(&str, &str)> {
        self.service_operation
            .as_ref()
            .map(|(s, o)| (s.as_str(), o.as_str()))
    }

    /// `None` when load cannot be assessed for this request.
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn metrics(&self) -> &dyn MetricsSink {
        self.metrics.as_ref()
    }

    pub(crate) fn memo(&self) -> &MemoTable {
        &self.memo
    }
}
