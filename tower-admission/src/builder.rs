use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use admission_policy::CATCH_ALL_KEY;
use admission_policy::ConfigError;
use admission_policy::Diagnostics;
use admission_policy::KeyGenerator;
use admission_policy::Memoizer;
use admission_policy::Throttler;
use admission_policy::Warning;

use crate::load_shed::LoadShedHandler;
use crate::throttling::ThrottlingHandler;

/// Joins identity and operation keys in the composite archetypes.
pub const ARCHETYPE_DELIMITER: &str = ",";

/// Named key generation schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    /// One key per present identity attribute: `"aws-account:123"`.
    Identity,
    /// The addressed operation: `"Operation:Svc/Op"`.
    Operation,
    /// Identity keys crossed with the operation key: `"aws-account:123,Operation:Svc/Op"`.
    IdentityOperation,
    /// The operation key crossed with identity keys: `"Operation:Svc/Op,aws-account:123"`.
    OperationIdentity,
}

impl Archetype {
    /// The key generator this archetype stands for, using `identity` for identity keys.
    pub fn key_generator(self, identity: KeyGenerator) -> KeyGenerator {
        match self {
            Self::Identity => identity,
            Self::Operation => KeyGenerator::operation(),
            Self::IdentityOperation => {
                KeyGenerator::product([identity, KeyGenerator::operation()], ARCHETYPE_DELIMITER)
            }
            Self::OperationIdentity => {
                KeyGenerator::product([KeyGenerator::operation(), identity], ARCHETYPE_DELIMITER)
            }
        }
    }
}

/// Settings every handler shares.
#[derive(Debug, Default)]
struct HandlerSettings {
    archetype: Option<Archetype>,
    key_generator: Option<KeyGenerator>,
    identity_attributes: Option<Vec<String>>,
    exemptions: HashSet<String>,
    throttler: Option<Arc<dyn Throttler>>,
    memoizer: Option<Arc<Memoizer>>,
    diagnostics: Option<Arc<Diagnostics>>,
}

struct Validated {
    key_generator: KeyGenerator,
    exemptions: HashSet<String>,
    memoizer: Arc<Memoizer>,
}

impl HandlerSettings {
    fn validate(self) -> Result<Validated, ConfigError> {
        let identity = match self.identity_attributes {
            Some(attributes) => KeyGenerator::identity(attributes)?,
            None => KeyGenerator::default_identity(),
        };

        let key_generator = match (self.archetype, self.key_generator) {
            (Some(archetype), None) => archetype.key_generator(identity),
            (None, Some(key_generator)) => key_generator,
            _ => return Err(ConfigError::KeySelection),
        };

        let diagnostics = self.diagnostics.unwrap_or_else(Diagnostics::global);
        let memoizer = match (self.throttler, self.memoizer) {
            (Some(throttler), None) => {
                Arc::new(Memoizer::new(throttler).with_diagnostics(diagnostics.clone()))
            }
            (None, Some(memoizer)) => memoizer,
            (None, None) => return Err(ConfigError::Missing("throttler")),
            (Some(_), Some(_)) => return Err(ConfigError::ThrottlerSelection),
        };

        if self.exemptions.contains(CATCH_ALL_KEY) && diagnostics.first_time(Warning::ExemptCatchAll)
        {
            warn!("the catch-all key \"\" is configured as an exemption; every request will be exempt");
        }

        Ok(Validated {
            key_generator,
            exemptions: self.exemptions,
            memoizer,
        })
    }
}

macro_rules! handler_settings {
    () => {
        /// Generate keys with a named archetype. Exclusive with
        /// [`Self::with_key_generator`].
        pub fn with_archetype(mut self, archetype: Archetype) -> Self {
            self.settings.archetype = Some(archetype);
            self
        }

        /// Generate keys with a custom generator. Exclusive with
        /// [`Self::with_archetype`].
        pub fn with_key_generator(mut self, key_generator: KeyGenerator) -> Self {
            self.settings.key_generator = Some(key_generator);
            self
        }

        /// Identity attributes used by the archetypes, in key order.
        ///
        /// Defaults to [`admission_policy::DEFAULT_IDENTITY_ATTRIBUTES`].
        pub fn with_identity_attributes<I, A>(mut self, attributes: I) -> Self
        where
            I: IntoIterator<Item = A>,
            A: Into<String>,
        {
            self.settings.identity_attributes =
                Some(attributes.into_iter().map(Into::into).collect());
            self
        }

        /// Keys that exempt a request from this handler.
        pub fn with_exemptions<I, K>(mut self, exemptions: I) -> Self
        where
            I: IntoIterator<Item = K>,
            K: Into<String>,
        {
            self.settings.exemptions = exemptions.into_iter().map(Into::into).collect();
            self
        }

        /// Evaluate keys with `throttler`, behind a memoizer private to this handler.
        pub fn with_throttler(mut self, throttler: Arc<dyn Throttler>) -> Self {
            self.settings.throttler = Some(throttler);
            self
        }

        /// Evaluate keys through a memoizer shared with other handlers.
        pub fn with_memoizer(mut self, memoizer: Arc<Memoizer>) -> Self {
            self.settings.memoizer = Some(memoizer);
            self
        }

        /// Report one-time warnings through `diagnostics` instead of the process-wide instance.
        pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
            self.settings.diagnostics = Some(diagnostics);
            self
        }
    };
}

/// Builds a [`ThrottlingHandler`].
#[derive(Debug, Default)]
pub struct ThrottlingHandlerBuilder {
    settings: HandlerSettings,
}

impl ThrottlingHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    handler_settings!();

    /// # Errors
    ///
    /// [`ConfigError`] when the key selection, identity attributes or
    /// throttler are missing or inconsistent.
    pub fn build(self) -> Result<ThrottlingHandler, ConfigError> {
        let Validated {
            key_generator,
            exemptions,
            memoizer,
        } = self.settings.validate()?;
        Ok(ThrottlingHandler::new(key_generator, exemptions, memoizer))
    }
}

/// Builds a [`LoadShedHandler`].
#[derive(Debug, Default)]
pub struct LoadShedHandlerBuilder {
    settings: HandlerSettings,
    capacity: Option<i64>,
}

impl LoadShedHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    handler_settings!();

    /// The in-flight count above which throttled requests are shed. Required.
    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// # Errors
    ///
    /// [`ConfigError`] when the capacity is missing or negative, or as for
    /// [`ThrottlingHandlerBuilder::build`].
    pub fn build(self) -> Result<LoadShedHandler, ConfigError> {
        let capacity = self.capacity.ok_or(ConfigError::Missing("capacity"))?;
        let capacity = u64::try_from(capacity).map_err(|_| ConfigError::NegativeCapacity(capacity))?;
        let Validated {
            key_generator,
            exemptions,
            memoizer,
        } = self.settings.validate()?;
        Ok(LoadShedHandler::new(
            key_generator,
            exemptions,
            memoizer,
            capacity,
        ))
    }
}
