/// Rejections produced by the admission handlers.
///
/// Both variants carry the key that caused the rejection. Everything else a
/// handler encounters (failed key generation, failed throttler evaluation) is
/// absorbed and never surfaces as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// A throttler reported `key` over its configured rate.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`.
    #[error("Throttling exceeded for key {key:?}")]
    ThrottlingExceeded {
        /// The first throttled key.
        key: String,
    },

    /// The process is over capacity and `key` was selected for shedding.
    ///
    /// `key` is the namespaced key the throttler was asked about
    /// (`"droppable-..."`). When the `axum` feature is enabled, this converts
    /// to `503 Service Unavailable`.
    #[error("Service overloaded; request shed on key {key:?}")]
    ServiceOverloaded {
        /// The first throttled, namespaced key.
        key: String,
    },
}

impl AdmissionError {
    pub fn key(&self) -> &str {
        match self {
            Self::ThrottlingExceeded { key } | Self::ServiceOverloaded { key } => key,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for AdmissionError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            Self::ThrottlingExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceOverloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_exposes_the_rejecting_key() {
        let throttled = AdmissionError::ThrottlingExceeded {
            key: "aws-account:1".to_string(),
        };
        let shed = AdmissionError::ServiceOverloaded {
            key: "droppable-aws-account:1".to_string(),
        };

        assert_eq!(throttled.key(), "aws-account:1");
        assert_eq!(shed.key(), "droppable-aws-account:1");
        assert_eq!(
            throttled.to_string(),
            "Throttling exceeded for key \"aws-account:1\""
        );
    }

    #[cfg(feature = "axum")]
    #[test]
    fn test_status_codes() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let throttled = AdmissionError::ThrottlingExceeded { key: "k".into() }.into_response();
        let shed = AdmissionError::ServiceOverloaded { key: "k".into() }.into_response();

        assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(shed.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
