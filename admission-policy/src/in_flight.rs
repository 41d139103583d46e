use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Counts requests currently being processed.
///
/// Clones share the same counter. Each request holds an [`InFlightGuard`] for as
/// long as it is being processed, and its [`InFlightGuard::observed`] value is the
/// estimate to hand to [`crate::RequestContext::with_in_flight`].
#[derive(Debug, Default, Clone)]
pub struct InFlightGauge {
    current: Arc<AtomicU64>,
}

impl InFlightGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request as in flight until the returned guard is dropped.
    pub fn enter(&self) -> InFlightGuard {
        let observed = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        InFlightGuard {
            current: Arc::clone(&self.current),
            observed,
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// Marks one request as in flight.
#[derive(Debug)]
pub struct InFlightGuard {
    current: Arc<AtomicU64>,
    observed: u64,
}

impl InFlightGuard {
    /// The number of in-flight requests, this one included, when it entered.
    pub fn observed(&self) -> u64 {
        self.observed
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_tracks_entries_and_exits() {
        let gauge = InFlightGauge::new();

        let first = gauge.enter();
        let second = gauge.clone().enter();
        assert_eq!(first.observed(), 1);
        assert_eq!(second.observed(), 2);
        assert_eq!(gauge.current(), 2);

        drop(first);
        assert_eq!(gauge.current(), 1);
        drop(second);
        assert_eq!(gauge.current(), 0);
    }

    #[tokio::test]
    async fn test_actual_concurrency() {
        let gauge = InFlightGauge::new();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let g = gauge.clone();
                tokio::spawn(async move {
                    let guard = g.enter();
                    tokio::task::yield_now().await;
                    guard.observed()
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let max = results.into_iter().map(|r| r.unwrap()).max().unwrap();

        more_asserts::assert_le!(max, 64);
        assert_eq!(gauge.current(), 0);
    }
}
