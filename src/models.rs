use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server's authoritative view of the current session
///
/// Never computed locally. Scheduling always uses the absolute timestamps
/// minus the current time; the `*_remaining` fields are for display and logs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub session_expires_at: DateTime<Utc>,
    pub auto_logout_warning_at: DateTime<Utc>,
    pub time_remaining: i64,
    pub warning_time_remaining: i64,
    pub is_expired: bool,
    pub needs_refresh: bool,
}

impl SessionInfo {
    /// Seconds left until the session expires, rounded up and clamped at zero
    ///
    /// Rounding up means the countdown only reads zero once the expiry
    /// instant has actually been reached.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.session_expires_at - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis + 999) / 1000
        }
    }

    /// Expired by the server's verdict or because the expiry instant has passed
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_expired || self.session_expires_at <= now
    }
}

/// Access/refresh credential pair held by the credential store
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens must never end up in logs
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Body of a successful `POST session/extend`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExtendResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_info: SessionInfo,
}

impl ExtendResponse {
    #[must_use]
    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(self.access_token.clone(), self.refresh_token.clone())
    }
}

/// Severity of an expiry warning
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    Warning,
    Critical,
    Expired,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::Warning => write!(f, "warning"),
            WarningKind::Critical => write!(f, "critical"),
            WarningKind::Expired => write!(f, "expired"),
        }
    }
}

/// Warning handed to the view layer; derived and emitted, never stored
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionWarning {
    pub kind: WarningKind,
    pub message: String,
    pub time_remaining_seconds: i64,
    /// Whether an "extend" action still makes sense
    pub offer_extend: bool,
}

impl SessionWarning {
    /// Build the warning for a live countdown value
    ///
    /// Strictly less than `critical_threshold_secs` remaining escalates the
    /// warning to [`WarningKind::Critical`]; a warning raised exactly at the
    /// threshold is still a plain [`WarningKind::Warning`].
    #[must_use]
    pub fn from_remaining(time_remaining_seconds: i64, critical_threshold_secs: i64) -> Self {
        if time_remaining_seconds <= 0 {
            return Self::expired();
        }

        let kind = if time_remaining_seconds < critical_threshold_secs {
            WarningKind::Critical
        } else {
            WarningKind::Warning
        };

        Self {
            kind,
            message: format!(
                "Your session will expire in {}",
                format_remaining(time_remaining_seconds)
            ),
            time_remaining_seconds,
            offer_extend: true,
        }
    }

    /// Final warning emitted when the countdown has run out
    #[must_use]
    pub fn expired() -> Self {
        Self {
            kind: WarningKind::Expired,
            message: "Your session has expired. Please sign in again.".to_string(),
            time_remaining_seconds: 0,
            offer_extend: false,
        }
    }
}

fn format_remaining(seconds: i64) -> String {
    let minutes = seconds / 60;
    let secs = seconds % 60;
    let plural = |n: i64| if n == 1 { "" } else { "s" };

    match (minutes, secs) {
        (0, s) => format!("{s} second{}", plural(s)),
        (m, 0) => format!("{m} minute{}", plural(m)),
        (m, s) => format!("{m} minute{} {s} second{}", plural(m), plural(s)),
    }
}

/// Why the manager forced a logout
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The server reported the session as already expired
    SessionExpired,
    /// The server rejected the credentials, or none were stored
    Unauthorized,
    /// The refresh call failed and the credentials could not be renewed
    RefreshFailed,
    /// The forced-logout timer fired
    Timeout,
    /// The local countdown reached zero before the logout timer fired
    ClockDrift,
    /// Requested by another part of the application
    Forced,
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LogoutReason::SessionExpired => "session expired",
            LogoutReason::Unauthorized => "session no longer authorized",
            LogoutReason::RefreshFailed => "session refresh failed",
            LogoutReason::Timeout => "session timed out",
            LogoutReason::ClockDrift => "session countdown elapsed",
            LogoutReason::Forced => "logout forced",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn info_expiring_in(seconds: i64) -> SessionInfo {
        let now = Utc::now();
        SessionInfo {
            access_token_expires_at: now + Duration::seconds(seconds),
            refresh_token_expires_at: now + Duration::seconds(seconds),
            session_expires_at: now + Duration::seconds(seconds),
            auto_logout_warning_at: now + Duration::seconds(seconds / 2),
            time_remaining: seconds,
            warning_time_remaining: seconds / 2,
            is_expired: false,
            needs_refresh: false,
        }
    }

    #[test]
    fn test_warning_kind_thresholds() {
        assert_eq!(SessionWarning::from_remaining(61, 60).kind, WarningKind::Warning);
        assert_eq!(SessionWarning::from_remaining(60, 60).kind, WarningKind::Warning);
        assert_eq!(SessionWarning::from_remaining(59, 60).kind, WarningKind::Critical);
        assert_eq!(SessionWarning::from_remaining(1, 60).kind, WarningKind::Critical);
        assert_eq!(SessionWarning::from_remaining(0, 60).kind, WarningKind::Expired);
        assert_eq!(SessionWarning::from_remaining(-5, 60).kind, WarningKind::Expired);
    }

    #[test]
    fn test_expired_warning_does_not_offer_extend() {
        let warning = SessionWarning::from_remaining(0, 60);
        assert!(!warning.offer_extend);
        assert_eq!(warning.time_remaining_seconds, 0);

        assert!(SessionWarning::from_remaining(30, 60).offer_extend);
    }

    #[test]
    fn test_warning_messages() {
        assert_eq!(
            SessionWarning::from_remaining(90, 60).message,
            "Your session will expire in 1 minute 30 seconds"
        );
        assert_eq!(
            SessionWarning::from_remaining(120, 60).message,
            "Your session will expire in 2 minutes"
        );
        assert_eq!(
            SessionWarning::from_remaining(1, 60).message,
            "Your session will expire in 1 second"
        );
    }

    #[test]
    fn test_session_info_deserializes_server_payload() {
        let json = r#"{
            "access_token_expires_at": "2026-01-01T10:05:00Z",
            "refresh_token_expires_at": "2026-01-01T12:00:00Z",
            "session_expires_at": "2026-01-01T11:00:00Z",
            "auto_logout_warning_at": "2026-01-01T10:55:00Z",
            "time_remaining": 3600,
            "warning_time_remaining": 3300,
            "is_expired": false,
            "needs_refresh": true
        }"#;

        let info: SessionInfo = serde_json::from_str(json).unwrap();
        assert!(info.needs_refresh);
        assert!(!info.is_expired);
        assert_eq!(info.time_remaining, 3600);
        assert_eq!(
            info.session_expires_at.to_rfc3339(),
            "2026-01-01T11:00:00+00:00"
        );
    }

    #[test]
    fn test_remaining_and_expiry() {
        let info = info_expiring_in(120);
        let now = Utc::now();
        assert!((119..=120).contains(&info.remaining_at(now)));
        assert!(!info.is_expired_at(now));
        assert!(info.is_expired_at(now + Duration::seconds(121)));
        assert_eq!(info.remaining_at(now + Duration::seconds(500)), 0);

        let mut flagged = info_expiring_in(120);
        flagged.is_expired = true;
        assert!(flagged.is_expired_at(now));
    }

    #[test]
    fn test_token_pair_debug_is_redacted() {
        let tokens = TokenPair::new("secret-access", "secret-refresh");
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_logout_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&LogoutReason::RefreshFailed).unwrap(),
            "\"refresh_failed\""
        );
        assert_eq!(
            serde_json::to_string(&WarningKind::Critical).unwrap(),
            "\"critical\""
        );
    }
}
