use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use admission_policy::KeyGenerator;
use admission_policy::Memoizer;
use admission_policy::RequestContext;

use crate::builder::LoadShedHandlerBuilder;
use crate::error::AdmissionError;
use crate::handler::Gate;
use crate::handler::Handler;
use crate::handler::MetricNames;

/// Prefix separating load shedding keys from throttling keys in a shared throttler.
pub const LOAD_SHED_PREFIX: &str = "droppable";
/// Joins [`LOAD_SHED_PREFIX`] to each key.
pub const LOAD_SHED_DELIMITER: &str = "-";

pub(crate) const LOAD_SHED_METRICS: MetricNames = MetricNames {
    decision: "LoadShed",
    time: "LoadShedTime",
    keys_checked: "LoadShedKeysChecked",
    key: "LoadShedKey",
};

/// Sheds requests while the process is over capacity.
///
/// Evaluation follows [`crate::ThrottlingHandler`], except that every key is
/// queried as `"droppable-" + key` and a throttled key only rejects the request
/// when the context reports more requests in flight than `capacity`. Below
/// capacity every key is still queried, so the throttler keeps counting.
///
/// A request whose in-flight count is unknown is admitted without querying
/// anything. An exemption applies whether it is written as the plain key
/// (`"k"`) or the namespaced one (`"droppable-k"`).
#[derive(Debug)]
pub struct LoadShedHandler {
    gate: Gate,
    capacity: u64,
}

impl LoadShedHandler {
    pub fn builder() -> LoadShedHandlerBuilder {
        LoadShedHandlerBuilder::new()
    }

    pub(crate) fn new(
        key_generator: KeyGenerator,
        exemptions: HashSet<String>,
        memoizer: Arc<Memoizer>,
        capacity: u64,
    ) -> Self {
        let gate = Gate::new(key_generator, exemptions, memoizer, LOAD_SHED_METRICS)
            .with_namespace(LOAD_SHED_PREFIX, LOAD_SHED_DELIMITER);
        Self { gate, capacity }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
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

impl Handler for LoadShedHandler {
    fn before(&self, ctx: &RequestContext) -> Result<(), AdmissionError> {
        let Some(in_flight) = ctx.in_flight() else {
            debug!("in-flight count unknown; skipping load shedding");
            self.gate.skip(ctx);
            return Ok(());
        };

        match self.gate.evaluate(ctx, in_flight > self.capacity) {
            Some(key) => Err(AdmissionError::ServiceOverloaded { key }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use admission_policy::mocks::TrackingThrottler;

    use super::*;

    fn handler(keys: &[&str], exemptions: &[&str], throttler: Arc<TrackingThrottler>, capacity: u64) -> LoadShedHandler {
        LoadShedHandler::new(
            KeyGenerator::fixed(keys.iter().copied()),
            exemptions.iter().map(|k| k.to_string()).collect(),
            Arc::new(Memoizer::new(throttler)),
            capacity,
        )
    }

    #[test]
    fn it_sheds_over_capacity() {
        let throttler = Arc::new(TrackingThrottler::deny(["droppable-k"]));
        let handler = handler(&["k"], &[], throttler, 2);

        let result = handler.before(&RequestContext::new().with_in_flight(3));

        assert_eq!(
            result,
            Err(AdmissionError::ServiceOverloaded {
                key: "droppable-k".into()
            })
        );
    }

    #[test]
    fn test_at_capacity_is_not_over() {
        let throttler = Arc::new(TrackingThrottler::deny(["droppable-k"]));
        let handler = handler(&["k"], &[], throttler.clone(), 2);

        assert_eq!(handler.before(&RequestContext::new().with_in_flight(2)), Ok(()));
        assert_eq!(throttler.calls(), vec!["droppable-k", "droppable-"]);
    }

    #[test]
    fn test_catch_all_is_namespaced() {
        let throttler = Arc::new(TrackingThrottler::deny(["droppable-"]));
        let handler = handler(&[], &[], throttler, 0);

        let result = handler.before(&RequestContext::new().with_in_flight(1));

        assert_eq!(
            result,
            Err(AdmissionError::ServiceOverloaded {
                key: "droppable-".into()
            })
        );
    }

    #[test]
    fn test_exemptions_match_plain_and_namespaced_keys() {
        let throttler = Arc::new(TrackingThrottler::deny(["droppable-k"]));

        let plain = handler(&["k"], &["k"], throttler.clone(), 0);
        assert_eq!(plain.before(&RequestContext::new().with_in_flight(5)), Ok(()));

        let namespaced = handler(&["k"], &["droppable-k"], throttler.clone(), 0);
        assert_eq!(namespaced.before(&RequestContext::new().with_in_flight(5)), Ok(()));

        assert!(throttler.calls().is_empty());
    }
}
