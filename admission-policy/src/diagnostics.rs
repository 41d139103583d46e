use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

static GLOBAL: LazyLock<Arc<Diagnostics>> = LazyLock::new(|| Arc::new(Diagnostics::new()));

/// Conditions that are worth one log line per process, not one per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// One throttler instance is wrapped by more than one memoizer inside a
    /// single request, so that request is counted once per memoizer.
    UnsharedThrottler,
    /// The catch-all key was configured as an exemption, which exempts every request.
    ExemptCatchAll,
}

/// One-time warning state shared by every memoizer and handler that holds it.
///
/// Production code shares [`Diagnostics::global`]. Tests inject their own instance
/// so warnings can be observed and reset.
#[derive(Debug, Default)]
pub struct Diagnostics {
    unshared_throttler: AtomicBool,
    exempt_catch_all: AtomicBool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance.
    pub fn global() -> Arc<Diagnostics> {
        Arc::clone(&GLOBAL)
    }

    /// Returns `true` exactly once per `warning`, for the first caller to get here.
    pub fn first_time(&self, warning: Warning) -> bool {
        self.flag(warning)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_warned(&self, warning: Warning) -> bool {
        self.flag(warning).load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.unshared_throttler.store(false, Ordering::Release);
        self.exempt_catch_all.store(false, Ordering::Release);
    }

    fn flag(&self, warning: Warning) -> &AtomicBool {
        match warning {
            Warning::UnsharedThrottler => &self.unshared_throttler,
            Warning::ExemptCatchAll => &self.exempt_catch_all,
        }
    }
}
