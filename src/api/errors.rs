//! Transport error classification
//!
//! Every non-2xx response and transport failure is mapped onto a small typed
//! taxonomy so the session manager can tell an invalidated session apart from
//! a failure that is worth retrying on the next tick.

use thiserror::Error;

/// Longest server error body kept in an [`ApiError::Server`] message
const MAX_ERROR_BODY_LEN: usize = 200;

/// Failure of a remote API call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// HTTP 401/403: the session is no longer valid server-side
    #[error("session is no longer authorized")]
    Unauthorized,

    /// Connect, timeout or other transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Any other non-2xx response
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// A 2xx response whose body did not match the expected contract
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// The client could not be built from its configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Classify a non-success HTTP status and its body
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ApiError::Unauthorized,
            _ => {
                let trimmed = body.trim();
                let message = if trimmed.is_empty() {
                    "no response body".to_string()
                } else {
                    trimmed.chars().take(MAX_ERROR_BODY_LEN).collect()
                };
                ApiError::Server { status, message }
            }
        }
    }

    /// True when the server has invalidated the session
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// True for failures that may succeed if simply tried again later
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), "")
        } else if err.is_builder() {
            ApiError::Configuration(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_statuses() {
        assert_eq!(ApiError::from_status(401, ""), ApiError::Unauthorized);
        assert_eq!(ApiError::from_status(403, "forbidden"), ApiError::Unauthorized);
        assert!(ApiError::from_status(401, "").is_unauthorized());
    }

    #[test]
    fn test_server_error_keeps_trimmed_body() {
        let err = ApiError::from_status(503, "  maintenance window \n");
        assert_eq!(
            err,
            ApiError::Server {
                status: 503,
                message: "maintenance window".to_string()
            }
        );
        assert!(!err.is_transient());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_server_error_body_is_truncated() {
        let body = "x".repeat(1000);
        match ApiError::from_status(500, &body) {
            ApiError::Server { message, .. } => assert_eq!(message.len(), MAX_ERROR_BODY_LEN),
            other => panic!("Expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_body_placeholder() {
        match ApiError::from_status(502, "") {
            ApiError::Server { message, .. } => assert_eq!(message, "no response body"),
            other => panic!("Expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(ApiError::Network("connection reset".to_string()).is_transient());
        assert!(!ApiError::Decode("missing field".to_string()).is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
    }
}
