use std::fmt::Debug;
use std::sync::Arc;

use crate::context::DEFAULT_IDENTITY_ATTRIBUTES;
use crate::context::RequestContext;
use crate::error::ConfigError;
use crate::error::PolicyError;

/// The catch-all key, evaluated after every generated key.
pub const CATCH_ALL_KEY: &str = "";

/// A user supplied source of keys, wrapped by [`KeyGenerator::Custom`].
pub trait KeySource: Send + Sync + Debug {
    /// Produce the keys for one request.
    ///
    /// # Errors
    ///
    /// Callers treat an error as "no keys" for this request.
    fn keys(&self, ctx: &RequestContext) -> Result<Vec<String>, PolicyError>;
}

/// Derives throttling keys from a request.
///
/// Generators are pure: the same context always yields the same keys in the
/// same order.
#[derive(Debug, Clone)]
pub enum KeyGenerator {
    /// A fixed list of keys.
    Static(Vec<String>),
    /// One `"attr:value"` key per configured identity attribute present on the request.
    Identity(Vec<String>),
    /// `"Operation:<service>/<operation>"` when the request names both.
    Operation,
    /// Crosses the keys of each generator with the next, left to right.
    CartesianProduct {
        generators: Vec<KeyGenerator>,
        delimiter: String,
    },
    /// A user supplied generator.
    Custom(Arc<dyn KeySource>),
}

impl KeyGenerator {
    pub fn fixed<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::Static(keys.into_iter().map(Into::into).collect())
    }

    /// Keys from the named identity attributes.
    ///
    /// # Errors
    ///
    /// Fails when no attribute names, or an empty name, are given.
    pub fn identity<I, A>(attributes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let attributes: Vec<String> = attributes.into_iter().map(Into::into).collect();
        if attributes.is_empty() {
            return Err(ConfigError::Empty("identity_attributes"));
        }
        if attributes.iter().any(String::is_empty) {
            return Err(ConfigError::Empty("identity attribute name"));
        }
        Ok(Self::Identity(attributes))
    }

    /// Keys from account id, access key and remote address.
    pub fn default_identity() -> Self {
        Self::Identity(
            DEFAULT_IDENTITY_ATTRIBUTES
                .iter()
                .map(|a| a.to_string())
                .collect(),
        )
    }

    pub fn operation() -> Self {
        Self::Operation
    }

    pub fn product<I>(generators: I, delimiter: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = KeyGenerator>,
    {
        Self::CartesianProduct {
            generators: generators.into_iter().collect(),
            delimiter: delimiter.into(),
        }
    }

    /// Prepend `prefix` and `delimiter` to every key of `inner`.
    pub fn prefixed(
        prefix: impl Into<String>,
        delimiter: impl Into<String>,
        inner: KeyGenerator,
    ) -> Self {
        Self::product([Self::Static(vec![prefix.into()]), inner], delimiter)
    }

    pub fn custom(source: Arc<dyn KeySource>) -> Self {
        Self::Custom(source)
    }

    /// Generate the keys for `ctx`.
    ///
    /// # Errors
    ///
    /// Only [`KeyGenerator::Custom`] sources (directly or nested in a product) fail.
    pub fn keys(&self, ctx: &RequestContext) -> Result<Vec<String>, PolicyError> {
        match self {
            Self::Static(keys) => Ok(keys.clone()),
            Self::Identity(attributes) => Ok(attributes
                .iter()
                .filter_map(|name| {
                    ctx.identity_attribute(name)
                        .map(|value| format!("{name}:{value}"))
                })
                .collect()),
            Self::Operation => Ok(ctx
                .service_operation()
                .map(|(service, operation)| format!("Operation:{service}/{operation}"))
                .into_iter()
                .collect()),
            Self::CartesianProduct {
                generators,
                delimiter,
            } => cartesian_product(generators, delimiter, ctx),
            Self::Custom(source) => source.keys(ctx),
        }
    }
}

fn cartesian_product(
    generators: &[KeyGenerator],
    delimiter: &str,
    ctx: &RequestContext,
) -> Result<Vec<String>, PolicyError> {
    let Some((first, rest)) = generators.split_first() else {
        return Ok(Vec::new());
    };

    let mut working = first.keys(ctx)?;
    for generator in rest {
        // Nothing left to cross; later keys would be discarded anyway.
        if working.is_empty() {
            break;
        }
        let next = generator.keys(ctx)?;
        working = working
            .iter()
            .flat_map(|old| next.iter().map(move |n| format!("{old}{delimiter}{n}")))
            .collect();
    }
    Ok(working)
}
