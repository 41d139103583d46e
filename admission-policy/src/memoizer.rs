use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tracing::warn;

use crate::context::RequestContext;
use crate::diagnostics::Diagnostics;
use crate::diagnostics::Warning;
use crate::error::PolicyError;
use crate::throttler::Throttler;

static NEXT_MEMOIZER_ID: AtomicU64 = AtomicU64::new(1);

/// Guarantees a throttler is asked at most once per key per request.
///
/// A `Memoizer` outlives requests. For each request it keeps a [`MemoCache`] in
/// the request's [`RequestContext`], created the first time any handler using
/// this memoizer sees the request. Handlers that share one `Memoizer` (via
/// `Arc`) therefore share one set of decisions, and the wrapped throttler
/// counts the request once per key no matter how many of them evaluate it.
#[derive(Debug)]
pub struct Memoizer {
    id: u64,
    throttler: Arc<dyn Throttler>,
    diagnostics: Arc<Diagnostics>,
}

impl Memoizer {
    pub fn new(throttler: Arc<dyn Throttler>) -> Self {
        Self {
            id: NEXT_MEMOIZER_ID.fetch_add(1, Ordering::Relaxed),
            throttler,
            diagnostics: Diagnostics::global(),
        }
    }

    /// Report one-time warnings through `diagnostics` instead of the process-wide instance.
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn throttler(&self) -> &Arc<dyn Throttler> {
        &self.throttler
    }

    /// The decision for `key` in the request described by `ctx`.
    ///
    /// The wrapped throttler is only asked the first time. A failed evaluation is
    /// remembered as "not throttled" and its error is returned to that first
    /// caller only.
    ///
    /// # Errors
    ///
    /// Whatever the wrapped throttler returned on its one evaluation of `key`.
    pub fn is_throttled(&self, key: &str, ctx: &RequestContext) -> Result<bool, PolicyError> {
        let cache = self.cache(ctx);
        let mut decisions = cache.decisions();
        if let Some(&throttled) = decisions.get(key) {
            return Ok(throttled);
        }

        let result = self.throttler.is_throttled(key, ctx.metrics());
        decisions.insert(key.to_owned(), matches!(result, Ok(true)));
        result
    }

    /// This memoizer's cache for the request, created on first use.
    pub fn cache(&self, ctx: &RequestContext) -> Arc<MemoCache> {
        let mut caches = ctx.memo().caches();
        if let Some(cache) = caches.iter().find(|c| c.owner == self.id) {
            return Arc::clone(cache);
        }

        let throttler = throttler_address(&self.throttler);
        if caches.iter().any(|c| c.throttler == throttler)
            && self.diagnostics.first_time(Warning::UnsharedThrottler)
        {
            warn!(
                throttler = ?self.throttler,
                "one throttler is wrapped by several memoizers in the same request; \
                 share a single Memoizer between the handlers so each key is counted once"
            );
        }

        let cache = Arc::new(MemoCache {
            owner: self.id,
            throttler,
            decisions: Mutex::new(HashMap::new()),
        });
        caches.push(Arc::clone(&cache));
        cache
    }
}

fn throttler_address(throttler: &Arc<dyn Throttler>) -> usize {
    Arc::as_ptr(throttler) as *const () as usize
}

/// The decisions one [`Memoizer`] made for one request.
#[derive(Debug)]
pub struct MemoCache {
    owner: u64,
    throttler: usize,
    decisions: Mutex<HashMap<String, bool>>,
}

impl MemoCache {
    /// The cached decision for `key`, if it was evaluated in this request.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.decisions().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.decisions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions().is_empty()
    }

    fn decisions(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.decisions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Request-scoped slot holding the [`MemoCache`] of every memoizer that saw the request.
#[derive(Debug, Default)]
pub struct MemoTable {
    caches: Mutex<Vec<Arc<MemoCache>>>,
}

impl MemoTable {
    fn caches(&self) -> MutexGuard<'_, Vec<Arc<MemoCache>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::mocks::FailingThrottler;
    use crate::mocks::TrackingThrottler;

    #[test]
    fn it_asks_once_per_key_per_request() {
        let throttler = Arc::new(TrackingThrottler::deny(["k"]));
        let memoizer = Memoizer::new(throttler.clone());
        let ctx = RequestContext::new();

        assert!(memoizer.is_throttled("k", &ctx).unwrap());
        assert!(memoizer.is_throttled("k", &ctx).unwrap());
        assert!(!memoizer.is_throttled("j", &ctx).unwrap());
        assert!(!memoizer.is_throttled("j", &ctx).unwrap());

        assert_eq!(throttler.call_count("k"), 1);
        assert_eq!(throttler.call_count("j"), 1);
        assert_eq!(memoizer.cache(&ctx).len(), 2);
    }

    #[test]
    fn test_concurrent_lookups_ask_once() {
        let threads = 8;
        let throttler = Arc::new(TrackingThrottler::deny(["k"]));
        let memoizer = Arc::new(Memoizer::new(throttler.clone()));
        let ctx = Arc::new(RequestContext::new());
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let memoizer = memoizer.clone();
                let ctx = ctx.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    memoizer.is_throttled("k", &ctx)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(true));
        }
        assert_eq!(throttler.call_count("k"), 1);
    }

    #[test]
    fn test_new_request_asks_again() {
        let throttler = Arc::new(TrackingThrottler::deny(["k"]));
        let memoizer = Memoizer::new(throttler.clone());

        let first = RequestContext::new();
        memoizer.is_throttled("k", &first).unwrap();
        let second = RequestContext::new();
        memoizer.is_throttled("k", &second).unwrap();

        assert_eq!(throttler.call_count("k"), 2);
    }

    #[test]
    fn test_failures_are_remembered_as_clear() {
        let memoizer = Memoizer::new(Arc::new(FailingThrottler));
        let ctx = RequestContext::new();

        assert!(memoizer.is_throttled("k", &ctx).is_err());
        assert_eq!(memoizer.is_throttled("k", &ctx), Ok(false));
        assert_eq!(memoizer.cache(&ctx).get("k"), Some(false));
    }

    #[test]
    fn test_memoizers_keep_separate_caches() {
        let first = Memoizer::new(Arc::new(TrackingThrottler::deny(["k"])));
        let second = Memoizer::new(Arc::new(TrackingThrottler::deny(Vec::<String>::new())));
        let ctx = RequestContext::new();

        assert!(first.is_throttled("k", &ctx).unwrap());
        assert!(!second.is_throttled("k", &ctx).unwrap());
        assert!(!Arc::ptr_eq(&first.cache(&ctx), &second.cache(&ctx)));
    }

    #[test]
    fn test_unshared_throttler_warns_once() {
        let diagnostics = Arc::new(Diagnostics::new());
        let throttler: Arc<dyn Throttler> = Arc::new(TrackingThrottler::deny(["k"]));
        let first = Memoizer::new(throttler.clone()).with_diagnostics(diagnostics.clone());
        let second = Memoizer::new(throttler).with_diagnostics(diagnostics.clone());

        let ctx = RequestContext::new();
        first.is_throttled("k", &ctx).unwrap();
        assert!(!diagnostics.has_warned(Warning::UnsharedThrottler));

        second.is_throttled("k", &ctx).unwrap();
        assert!(diagnostics.has_warned(Warning::UnsharedThrottler));
    }

    #[test]
    fn test_shared_memoizer_does_not_warn() {
        let diagnostics = Arc::new(Diagnostics::new());
        let memoizer = Arc::new(
            Memoizer::new(Arc::new(TrackingThrottler::deny(["k"])))
                .with_diagnostics(diagnostics.clone()),
        );
        let ctx = RequestContext::new();

        memoizer.is_throttled("k", &ctx).unwrap();
        Arc::clone(&memoizer).is_throttled("k", &ctx).unwrap();

        assert!(!diagnostics.has_warned(Warning::UnsharedThrottler));
    }
}
