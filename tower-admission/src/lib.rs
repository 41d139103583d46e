//! # Tower Admission
//!
//! `tower-admission` decides, before a request is handled, whether it may
//! proceed. It provides two handlers built on [`admission_policy`] and a
//! [Tower](https://github.com/tower-rs/tower) layer that runs them.
//!
//! ## Handlers
//!
//! 1. **[`ThrottlingHandler`]**: rejects a request with
//!    [`AdmissionError::ThrottlingExceeded`] when a throttler reports one of
//!    its keys, or the catch-all key `""`, over its rate.
//! 2. **[`LoadShedHandler`]**: rejects a request with
//!    [`AdmissionError::ServiceOverloaded`] when one of its `"droppable-"`
//!    keys is throttled *and* more requests are in flight than the configured
//!    capacity.
//!
//! Both evaluate keys in order, skip any request carrying an exempt key, and
//! fail open: a key generator or throttler that errors contributes no signal.
//! Handlers that share one [`admission_policy::Memoizer`] ask the throttler at
//! most once per key per request.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use admission_policy::RequestContext;
//! use admission_policy::StaticThrottler;
//! use admission_policy::ACCOUNT_ID;
//! use tower_admission::Archetype;
//! use tower_admission::Handler;
//! use tower_admission::ThrottlingHandler;
//!
//! let handler = ThrottlingHandler::builder()
//!     .with_archetype(Archetype::Identity)
//!     .with_throttler(Arc::new(StaticThrottler::deny(["aws-account:666"])))
//!     .build()
//!     .unwrap();
//!
//! let ctx = RequestContext::new().with_identity(ACCOUNT_ID, "666");
//! assert!(handler.before(&ctx).is_err());
//! ```
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`AdmissionError`] (429 and 503) and
//!   lets `http::Request` carry its [`admission_policy::RequestContext`] in its
//!   extensions.

mod builder;
mod config;
mod error;
mod handler;
mod layer;
mod load_shed;
mod otel;
mod service;
mod throttling;
mod utils;


pub use builder::ARCHETYPE_DELIMITER;
pub use builder::Archetype;
pub use builder::LoadShedHandlerBuilder;
pub use builder::ThrottlingHandlerBuilder;
pub use config::AdmissionConfig;
pub use config::AdmissionHandlers;
pub use config::HandlerConfig;
pub use config::ThrottlerConfig;
pub use error::AdmissionError;
pub use handler::Handler;
pub use layer::AdmissionLayer;
pub use load_shed::LOAD_SHED_DELIMITER;
pub use load_shed::LOAD_SHED_PREFIX;
pub use load_shed::LoadShedHandler;
pub use otel::OtelMetrics;
pub use service::AdmissionRequest;
pub use service::AdmissionService;
pub use service::ResponseFuture;
pub use throttling::ThrottlingHandler;
pub use utils::ServiceBuilderExt;
