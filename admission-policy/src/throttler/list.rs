use std::collections::HashSet;

use serde::Deserialize;

use crate::error::PolicyError;
use crate::metrics::MetricsSink;

use super::Throttler;

/// How a [`StaticThrottler`] interprets its key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListMode {
    /// Throttle exactly the listed keys.
    Deny,
    /// Throttle every key that is not listed.
    AllowOnly,
}

/// A fixed block list or allow list.
#[derive(Debug, Clone)]
pub struct StaticThrottler {
    mode: ListMode,
    keys: HashSet<String>,
}

impl StaticThrottler {
    pub fn new<I, K>(mode: ListMode, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            mode,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Throttle the listed keys.
    pub fn deny<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::new(ListMode::Deny, keys)
    }

    /// Throttle everything except the listed keys.
    pub fn allow_only<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::new(ListMode::AllowOnly, keys)
    }

    pub fn mode(&self) -> ListMode {
        self.mode
    }
}

impl Throttler for StaticThrottler {
    fn is_throttled(&self, key: &str, _metrics: &dyn MetricsSink) -> Result<bool, PolicyError> {
        let listed = self.keys.contains(key);
        Ok(match self.mode {
            ListMode::Deny => listed,
            ListMode::AllowOnly => !listed,
        })
    }
}
