//! Declarative handler configuration.
//!
//! These types deserialize from any serde format and build handlers through
//! the same validating builders as code does. Reading the document is left to
//! the embedding application.
//!
//! ```json
//! {
//!   "throttler": {
//!     "type": "composite",
//!     "throttlers": [
//!       { "type": "list", "mode": "deny", "keys": ["aws-account:666"] },
//!       { "type": "local", "limits": { "aws-account:123": 50.0, "": 1000.0 } }
//!     ]
//!   },
//!   "throttling": { "archetype": "identity", "exemptions": ["aws-account:1"] },
//!   "load_shed": { "archetype": "operation", "capacity": 64 }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use admission_policy::CompositeThrottler;
use admission_policy::ConfigError;
use admission_policy::ListMode;
use admission_policy::LocalThrottler;
use admission_policy::Memoizer;
use admission_policy::NoOpThrottler;
use admission_policy::StaticThrottler;
use admission_policy::Throttler;

use crate::builder::Archetype;
use crate::load_shed::LoadShedHandler;
use crate::throttling::ThrottlingHandler;

/// A throttler description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThrottlerConfig {
    /// In-process fixed window limits, requests per second by key.
    Local { limits: HashMap<String, f64> },
    /// A fixed key list: `deny` throttles exactly these keys, `allow_only`
    /// throttles every key but these.
    List { mode: ListMode, keys: Vec<String> },
    /// Never throttle.
    NoOp,
    /// Throttle when any member does, asked in order.
    Composite { throttlers: Vec<ThrottlerConfig> },
}

impl ThrottlerConfig {
    /// # Errors
    ///
    /// [`ConfigError::InvalidLimit`] for a negative or NaN local limit.
    pub fn build(&self) -> Result<Arc<dyn Throttler>, ConfigError> {
        let throttler: Arc<dyn Throttler> = match self {
            Self::Local { limits } => Arc::new(LocalThrottler::new(
                limits.iter().map(|(k, v)| (k.as_str(), *v)),
            )?),
            Self::List { mode, keys } => Arc::new(StaticThrottler::new(*mode, keys)),
            Self::NoOp => Arc::new(NoOpThrottler),
            Self::Composite { throttlers } => Arc::new(CompositeThrottler::new(
                throttlers
                    .iter()
                    .map(ThrottlerConfig::build)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
        };
        Ok(throttler)
    }
}

/// Settings for one handler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    pub archetype: Archetype,
    #[serde(default)]
    pub identity_attributes: Option<Vec<String>>,
    #[serde(default)]
    pub exemptions: Vec<String>,
    /// Load shedding only.
    #[serde(default)]
    pub capacity: Option<i64>,
}

impl HandlerConfig {
    /// # Errors
    ///
    /// As [`crate::ThrottlingHandlerBuilder::build`].
    pub fn throttling_handler(&self, memoizer: Arc<Memoizer>) -> Result<ThrottlingHandler, ConfigError> {
        let mut builder = ThrottlingHandler::builder()
            .with_archetype(self.archetype)
            .with_exemptions(&self.exemptions)
            .with_memoizer(memoizer);
        if let Some(attributes) = &self.identity_attributes {
            builder = builder.with_identity_attributes(attributes);
        }
        builder.build()
    }

    /// # Errors
    ///
    /// As [`crate::LoadShedHandlerBuilder::build`].
    pub fn load_shed_handler(&self, memoizer: Arc<Memoizer>) -> Result<LoadShedHandler, ConfigError> {
        let mut builder = LoadShedHandler::builder()
            .with_archetype(self.archetype)
            .with_exemptions(&self.exemptions)
            .with_memoizer(memoizer);
        if let Some(attributes) = &self.identity_attributes {
            builder = builder.with_identity_attributes(attributes);
        }
        if let Some(capacity) = self.capacity {
            builder = builder.with_capacity(capacity);
        }
        builder.build()
    }
}

/// A throttler and the handlers that share it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionConfig {
    pub throttler: ThrottlerConfig,
    #[serde(default)]
    pub throttling: Option<HandlerConfig>,
    #[serde(default)]
    pub load_shed: Option<HandlerConfig>,
}

/// Handlers built from an [`AdmissionConfig`].
#[derive(Debug)]
pub struct AdmissionHandlers {
    pub throttling: Option<ThrottlingHandler>,
    pub load_shed: Option<LoadShedHandler>,
}

impl AdmissionConfig {
    /// Build the configured handlers around one shared memoizer, so a request
    /// evaluated by both counts each key once.
    ///
    /// # Errors
    ///
    /// The first [`ConfigError`] found in the throttler or either handler.
    pub fn build(&self) -> Result<AdmissionHandlers, ConfigError> {
        let memoizer = Arc::new(Memoizer::new(self.throttler.build()?));
        let throttling = self
            .throttling
            .as_ref()
            .map(|config| config.throttling_handler(memoizer.clone()))
            .transpose()?;
        let load_shed = self
            .load_shed
            .as_ref()
            .map(|config| config.load_shed_handler(memoizer.clone()))
            .transpose()?;

        Ok(AdmissionHandlers {
            throttling,
            load_shed,
        })
    }
}
