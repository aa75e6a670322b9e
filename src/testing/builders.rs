//! Fluent builders for creating customizable test objects
//!
//! All instants are relative to the supplied clock's `now()`, so a builder
//! used with [`MockClock`](super::mock::MockClock) produces sessions that line
//! up with tokio's paused time.

use crate::clock::Clock;
use crate::models::{ExtendResponse, SessionInfo};
use chrono::Duration;

/// Builder for server session snapshots
pub struct SessionInfoBuilder {
    warn_in_secs: i64,
    expire_in_secs: i64,
    access_expires_in_secs: Option<i64>,
    is_expired: bool,
    needs_refresh: bool,
}

impl SessionInfoBuilder {
    /// Session expiring in 15 minutes with the warning 2 minutes before
    #[must_use]
    pub fn new() -> Self {
        Self {
            warn_in_secs: 780,
            expire_in_secs: 900,
            access_expires_in_secs: None,
            is_expired: false,
            needs_refresh: false,
        }
    }

    #[must_use]
    pub fn warn_in(mut self, seconds: i64) -> Self {
        self.warn_in_secs = seconds;
        self
    }

    #[must_use]
    pub fn expire_in(mut self, seconds: i64) -> Self {
        self.expire_in_secs = seconds;
        self
    }

    /// Access token lifetime; defaults to the session lifetime
    #[must_use]
    pub fn access_expires_in(mut self, seconds: i64) -> Self {
        self.access_expires_in_secs = Some(seconds);
        self
    }

    /// Server flags the session as expired
    #[must_use]
    pub fn expired(mut self) -> Self {
        self.is_expired = true;
        self
    }

    /// Server asks the client to refresh
    #[must_use]
    pub fn needs_refresh(mut self) -> Self {
        self.needs_refresh = true;
        self
    }

    #[must_use]
    pub fn build(self, clock: &dyn Clock) -> SessionInfo {
        let now = clock.now();
        let access = self.access_expires_in_secs.unwrap_or(self.expire_in_secs);
        SessionInfo {
            access_token_expires_at: now + Duration::seconds(access),
            refresh_token_expires_at: now + Duration::seconds(self.expire_in_secs + 3600),
            session_expires_at: now + Duration::seconds(self.expire_in_secs),
            auto_logout_warning_at: now + Duration::seconds(self.warn_in_secs),
            time_remaining: self.expire_in_secs.max(0),
            warning_time_remaining: self.warn_in_secs.max(0),
            is_expired: self.is_expired,
            needs_refresh: self.needs_refresh,
        }
    }

    /// Wrap the built session in an extend response carrying `generation` tokens
    #[must_use]
    pub fn build_extend(self, clock: &dyn Clock, generation: u32) -> ExtendResponse {
        ExtendResponse {
            access_token: format!("access-{generation}"),
            refresh_token: format!("refresh-{generation}"),
            session_info: self.build(clock),
        }
    }
}

impl Default for SessionInfoBuilder {
    fn default() -> Self {
        Self::new()
    }
}
