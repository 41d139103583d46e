use std::collections::HashSet;
use std::sync::Arc;

use admission_policy::KeyGenerator;
use admission_policy::Memoizer;
use admission_policy::RequestContext;

use crate::builder::ThrottlingHandlerBuilder;
use crate::error::AdmissionError;
use crate::handler::Gate;
use crate::handler::Handler;
use crate::handler::MetricNames;

pub(crate) const THROTTLE_METRICS: MetricNames = MetricNames {
    decision: "Throttle",
    time: "ThrottleTime",
    keys_checked: "ThrottleKeysChecked",
    key: "ThrottledKey",
};

/// Rejects requests whose keys a throttler reports over their rate.
///
/// For each request the handler generates keys, allows the request outright if
/// any key (or the catch-all key `""`) is exempt, and otherwise asks its
/// memoizer about every key in order followed by `""`. The first throttled key
/// rejects the request with [`AdmissionError::ThrottlingExceeded`]; the keys
/// after it are not evaluated.
///
/// Every evaluation records `Throttle` (0 or 1), `ThrottleTime`,
/// `ThrottleKeysChecked` and, on rejection, the `ThrottledKey` property.
#[derive(Debug)]
pub struct ThrottlingHandler {
    gate: Gate,
}

impl ThrottlingHandler {
    pub fn builder() -> ThrottlingHandlerBuilder {
        ThrottlingHandlerBuilder::new()
    }

    pub(crate) fn new(
        key_generator: KeyGenerator,
        exemptions: HashSet<String>,
        memoizer: Arc<Memoizer>,
    ) -> Self {
        Self {
            gate: Gate::new(key_generator, exemptions, memoizer, THROTTLE_METRICS),
        }
    }

    pub fn key_generator(&self) -> &KeyGenerator {
        self.gate.key_generator()
    }

    pub fn exemptions(&self) -> &HashSet<String> {
        self.gate.exemptions()
    }

    pub fn memoizer(&self) -> &Arc<Memoizer> {
        self.gate.memoizer()
    }
}

impl Handler for ThrottlingHandler {
    fn before(&self, ctx: &RequestContext) -> Result<(), AdmissionError> {
        match self.gate.evaluate(ctx, true) {
            Some(key) => Err(AdmissionError::ThrottlingExceeded { key }),
            None => Ok(()),
        }
    }
}
