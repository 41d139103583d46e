use std::collections::HashSet;
use std::fmt::Debug;
use std::iter;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use tracing::warn;

use admission_policy::CATCH_ALL_KEY;
use admission_policy::KeyGenerator;
use admission_policy::Memoizer;
use admission_policy::MetricsSink;
use admission_policy::PolicyError;
use admission_policy::RequestContext;

use crate::error::AdmissionError;

/// A request-pipeline hook deciding whether a request may proceed.
pub trait Handler: Send + Sync + Debug {
    /// Evaluate `ctx` before the request is handled.
    ///
    /// # Errors
    ///
    /// The rejection, when the request must not proceed.
    fn before(&self, ctx: &RequestContext) -> Result<(), AdmissionError>;
}

impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    fn before(&self, ctx: &RequestContext) -> Result<(), AdmissionError> {
        (**self).before(ctx)
    }
}

/// Names of the metrics one kind of handler emits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MetricNames {
    pub(crate) decision: &'static str,
    pub(crate) time: &'static str,
    pub(crate) keys_checked: &'static str,
    pub(crate) key: &'static str,
}

/// The evaluation shared by throttling and load shedding.
#[derive(Debug)]
pub(crate) struct Gate {
    key_generator: KeyGenerator,
    exemptions: HashSet<String>,
    memoizer: Arc<Memoizer>,
    namespace: Option<(String, String)>,
    metric_names: MetricNames,
}

impl Gate {
    pub(crate) fn new(
        key_generator: KeyGenerator,
        exemptions: HashSet<String>,
        memoizer: Arc<Memoizer>,
        metric_names: MetricNames,
    ) -> Self {
        Self {
            key_generator,
            exemptions,
            memoizer,
            namespace: None,
            metric_names,
        }
    }

    /// Query every key as `prefix`, `delimiter`, then the key.
    pub(crate) fn with_namespace(
        mut self,
        prefix: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> Self {
        self.namespace = Some((prefix.into(), delimiter.into()));
        self
    }

    pub(crate) fn key_generator(&self) -> &KeyGenerator {
        &self.key_generator
    }

    pub(crate) fn exemptions(&self) -> &HashSet<String> {
        &self.exemptions
    }

    pub(crate) fn memoizer(&self) -> &Arc<Memoizer> {
        &self.memoizer
    }

    /// Evaluate the request's keys, then the catch-all key, in order.
    ///
    /// Returns the first throttled (namespaced) key when `enforce` is set.
    /// Without `enforce` every key is still queried and nothing is returned.
    /// An exemption matches a key either before or after namespacing.
    pub(crate) fn evaluate(&self, ctx: &RequestContext, enforce: bool) -> Option<String> {
        let mut scope = DecisionScope::open(ctx.metrics(), self.metric_names);

        let candidates: Vec<String> = keys_or_nothing(self.key_generator.keys(ctx))
            .into_iter()
            .chain(iter::once(CATCH_ALL_KEY.to_owned()))
            .collect();
        let queries = self.namespaced(&candidates, ctx);

        if let Some(exempt) = candidates
            .iter()
            .chain(&queries)
            .find(|key| self.exemptions.contains(key.as_str()))
        {
            debug!(key = %exempt, "request exempt from admission checks");
            return None;
        }

        for query in queries {
            scope.keys_checked += 1;
            let throttled = throttled_or_clear(self.memoizer.is_throttled(&query, ctx), &query);
            if throttled && enforce {
                debug!(key = %query, "request rejected");
                scope.rejected = Some(query.clone());
                return Some(query);
            }
        }
        None
    }

    /// Record a decision for a request that could not be evaluated at all.
    pub(crate) fn skip(&self, ctx: &RequestContext) {
        drop(DecisionScope::open(ctx.metrics(), self.metric_names));
    }

    fn namespaced(&self, candidates: &[String], ctx: &RequestContext) -> Vec<String> {
        let Some((prefix, delimiter)) = &self.namespace else {
            return candidates.to_vec();
        };
        // A static inner generator cannot fail.
        KeyGenerator::prefixed(
            prefix.as_str(),
            delimiter.as_str(),
            KeyGenerator::Static(candidates.to_vec()),
        )
        .keys(ctx)
        .unwrap_or_default()
    }
}

/// Emits a decision's metrics when it goes out of scope, however it ends.
struct DecisionScope<'a> {
    metrics: &'a dyn MetricsSink,
    names: MetricNames,
    start: Instant,
    keys_checked: u64,
    rejected: Option<String>,
}

impl<'a> DecisionScope<'a> {
    fn open(metrics: &'a dyn MetricsSink, names: MetricNames) -> Self {
        Self {
            metrics,
            names,
            start: Instant::now(),
            keys_checked: 0,
            rejected: None,
        }
    }
}

impl Drop for DecisionScope<'_> {
    fn drop(&mut self) {
        self.metrics
            .add_count(self.names.decision, u64::from(self.rejected.is_some()));
        self.metrics.add_time(self.names.time, self.start.elapsed());
        self.metrics
            .add_count(self.names.keys_checked, self.keys_checked);
        if let Some(key) = &self.rejected {
            self.metrics.add_property(self.names.key, key);
        }
    }
}

/// Keys from a key generator, or none when it failed.
pub(crate) fn keys_or_nothing(result: Result<Vec<String>, PolicyError>) -> Vec<String> {
    match result {
        Ok(keys) => keys,
        Err(error) => {
            warn!(%error, "key generation failed; evaluating no keys for this request");
            Vec::new()
        }
    }
}

/// A throttler's answer for `key`, or "not throttled" when it failed.
pub(crate) fn throttled_or_clear(result: Result<bool, PolicyError>, key: &str) -> bool {
    match result {
        Ok(throttled) => throttled,
        Err(error) => {
            warn!(%error, key, "throttler evaluation failed; treating key as not throttled");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use admission_policy::RecordingMetrics;
    use admission_policy::mocks::FailingThrottler;
    use admission_policy::mocks::TrackingThrottler;

    use super::*;

    const NAMES: MetricNames = MetricNames {
        decision: "Decision",
        time: "DecisionTime",
        keys_checked: "DecisionKeysChecked",
        key: "DecisionKey",
    };

    fn gate(keys: &[&str], exemptions: &[&str], throttler: Arc<TrackingThrottler>) -> Gate {
        Gate::new(
            KeyGenerator::fixed(keys.iter().copied()),
            exemptions.iter().map(|k| k.to_string()).collect(),
            Arc::new(Memoizer::new(throttler)),
            NAMES,
        )
    }

    #[test]
    fn test_keys_or_nothing() {
        assert_eq!(keys_or_nothing(Ok(vec!["a".to_string()])), vec!["a"]);
        assert!(keys_or_nothing(Err(PolicyError::KeyGeneration("boom".into()))).is_empty());
    }

    #[test]
    fn test_throttled_or_clear() {
        assert!(throttled_or_clear(Ok(true), "k"));
        assert!(!throttled_or_clear(Ok(false), "k"));
        assert!(!throttled_or_clear(
            Err(PolicyError::Throttler("boom".into())),
            "k"
        ));
    }

    #[test]
    fn it_queries_the_catch_all_last() {
        let throttler = Arc::new(TrackingThrottler::deny(Vec::<String>::new()));
        let gate = gate(&["a", "b"], &[], throttler.clone());

        assert_eq!(gate.evaluate(&RequestContext::new(), true), None);
        assert_eq!(throttler.calls(), vec!["a", "b", ""]);
    }

    #[test]
    fn test_namespace_applies_to_every_query() {
        let throttler = Arc::new(TrackingThrottler::deny(["droppable-b"]));
        let gate = gate(&["a", "b"], &[], throttler.clone()).with_namespace("droppable", "-");

        let rejected = gate.evaluate(&RequestContext::new(), true);

        assert_eq!(rejected.as_deref(), Some("droppable-b"));
        assert_eq!(throttler.calls(), vec!["droppable-a", "droppable-b"]);
    }

    #[test]
    fn test_namespaced_exemption() {
        let throttler = Arc::new(TrackingThrottler::deny(["droppable-a"]));
        let gate = gate(&["a"], &["droppable-a"], throttler.clone()).with_namespace("droppable", "-");

        assert_eq!(gate.evaluate(&RequestContext::new(), true), None);
        assert!(throttler.calls().is_empty());
    }

    #[test]
    fn test_without_enforcement_every_key_is_queried() {
        let throttler = Arc::new(TrackingThrottler::deny(["a"]));
        let gate = gate(&["a", "b"], &[], throttler.clone());

        assert_eq!(gate.evaluate(&RequestContext::new(), false), None);
        assert_eq!(throttler.calls(), vec!["a", "b", ""]);
    }

    #[test]
    fn test_exempt_catch_all_allows_everything() {
        let throttler = Arc::new(TrackingThrottler::deny(["a", ""]));
        let gate = gate(&["a"], &[""], throttler.clone());

        assert_eq!(gate.evaluate(&RequestContext::new(), true), None);
        assert!(throttler.calls().is_empty());
    }

    #[test]
    fn test_failing_throttler_fails_open() {
        let gate = Gate::new(
            KeyGenerator::fixed(["a"]),
            HashSet::new(),
            Arc::new(Memoizer::new(Arc::new(FailingThrottler))),
            NAMES,
        );

        assert_eq!(gate.evaluate(&RequestContext::new(), true), None);
    }

    #[test]
    fn test_metrics_on_rejection() {
        let metrics = Arc::new(RecordingMetrics::new());
        let ctx = RequestContext::new().with_metrics(metrics.clone());
        let gate = gate(&["a", "b"], &[], Arc::new(TrackingThrottler::deny(["a"])));

        gate.evaluate(&ctx, true);

        assert_eq!(metrics.count("Decision"), Some(1));
        assert_eq!(metrics.count("DecisionKeysChecked"), Some(1));
        assert_eq!(metrics.times("DecisionTime").len(), 1);
        assert_eq!(metrics.property("DecisionKey").as_deref(), Some("a"));
    }

    #[test]
    fn test_skip_records_an_empty_decision() {
        let metrics = Arc::new(RecordingMetrics::new());
        let ctx = RequestContext::new().with_metrics(metrics.clone());
        let gate = gate(&["a"], &[], Arc::new(TrackingThrottler::deny(["a"])));

        gate.skip(&ctx);

        assert_eq!(metrics.count("Decision"), Some(0));
        assert_eq!(metrics.count("DecisionKeysChecked"), Some(0));
        assert_eq!(metrics.property("DecisionKey"), None);
    }
}
