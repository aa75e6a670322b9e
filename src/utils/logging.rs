// Centralized logging for session lifecycle transitions
use crate::models::{LogoutReason, SessionInfo, SessionWarning, WarningKind};
use crate::session::errors::SessionFailure;
use crate::session::lifecycle::RefreshOrigin;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log a freshly accepted session snapshot
    pub fn log_session_accepted(info: &SessionInfo, now: DateTime<Utc>) {
        debug!(
            "Session info accepted: expires in {}s, warning in {}s (server reports {}s/{}s)",
            info.remaining_at(now),
            (info.auto_logout_warning_at - now).num_seconds().max(0),
            info.time_remaining,
            info.warning_time_remaining
        );
    }

    /// Log the first warning of a countdown
    pub fn log_warning(warning: &SessionWarning) {
        match warning.kind {
            WarningKind::Critical => warn!(
                "⚠️  Session expiring in {}s (critical)",
                warning.time_remaining_seconds
            ),
            _ => info!(
                "⏳ Session expiring in {}s",
                warning.time_remaining_seconds
            ),
        }
    }

    /// Log refresh start
    pub(crate) fn log_refresh_start(origin: RefreshOrigin) {
        info!("🔄 Refreshing session tokens ({origin} request)");
    }

    /// Log a classified failure; only fatal ones are warnings
    pub fn log_session_failure(failure: &SessionFailure) {
        if failure.logout_reason().is_some() {
            warn!("❌ {failure}");
        } else {
            debug!("Session poll failed: {failure}");
        }
    }

    /// Log a forced logout
    pub fn log_logout(reason: LogoutReason) {
        info!("🚪 Logging out: {reason}");
    }
}
