//! Failure taxonomy of the session lifecycle
//!
//! None of these ever reach the view layer as errors. They decide whether the
//! manager shrugs and waits for the next poll, or forces a logout.

use crate::api::ApiError;
use crate::models::LogoutReason;
use std::fmt;

/// Classified failure observed by the lifecycle worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    /// A routine poll failed in a way the next tick may fix
    TransientNetworkFailure(ApiError),
    /// The server no longer accepts the session (or no credentials are stored)
    Unauthorized,
    /// The refresh call failed; the credentials cannot be renewed
    RefreshFailure(ApiError),
    /// The local countdown reached zero before the logout timer fired
    ClockDrift,
}

impl SessionFailure {
    /// Classify a failed poll
    #[must_use]
    pub fn from_poll_error(err: ApiError) -> Self {
        if err.is_unauthorized() {
            SessionFailure::Unauthorized
        } else {
            SessionFailure::TransientNetworkFailure(err)
        }
    }

    /// Classify a failed refresh; any refresh failure is fatal
    #[must_use]
    pub fn from_refresh_error(err: ApiError) -> Self {
        SessionFailure::RefreshFailure(err)
    }

    /// The logout this failure forces, or `None` when it is retried implicitly
    #[must_use]
    pub const fn logout_reason(&self) -> Option<LogoutReason> {
        match self {
            SessionFailure::TransientNetworkFailure(_) => None,
            SessionFailure::Unauthorized => Some(LogoutReason::Unauthorized),
            SessionFailure::RefreshFailure(_) => Some(LogoutReason::RefreshFailed),
            SessionFailure::ClockDrift => Some(LogoutReason::ClockDrift),
        }
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFailure::TransientNetworkFailure(err) => {
                write!(f, "transient failure, retrying on next poll: {err}")
            }
            SessionFailure::Unauthorized => write!(f, "session is no longer authorized"),
            SessionFailure::RefreshFailure(err) => write!(f, "session refresh failed: {err}"),
            SessionFailure::ClockDrift => {
                write!(f, "local countdown elapsed before the logout timer")
            }
        }
    }
}

impl std::error::Error for SessionFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_errors_classification() {
        assert_eq!(
            SessionFailure::from_poll_error(ApiError::Unauthorized),
            SessionFailure::Unauthorized
        );

        let transient = SessionFailure::from_poll_error(ApiError::Network("timeout".to_string()));
        assert!(transient.logout_reason().is_none());

        // Server errors on a poll are retried like network errors
        let server = SessionFailure::from_poll_error(ApiError::Server {
            status: 500,
            message: "boom".to_string(),
        });
        assert!(server.logout_reason().is_none());
    }

    #[test]
    fn test_refresh_errors_are_fatal() {
        let failure = SessionFailure::from_refresh_error(ApiError::Network("offline".to_string()));
        assert_eq!(failure.logout_reason(), Some(LogoutReason::RefreshFailed));
        assert!(failure.to_string().contains("offline"));
    }

    #[test]
    fn test_clock_drift_forces_logout() {
        assert_eq!(
            SessionFailure::ClockDrift.logout_reason(),
            Some(LogoutReason::ClockDrift)
        );
    }
}
