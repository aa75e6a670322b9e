//! Test fixtures providing pre-built test objects

use crate::clock::Clock;
use crate::models::{ExtendResponse, SessionInfo, TokenPair};
use crate::session::LifecycleConfig;
use crate::settings::Settings;

use super::builders::SessionInfoBuilder;
use super::constants::{TEST_ACCESS_TOKEN, TEST_BASE_URL, TEST_REFRESH_TOKEN};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// The credential pair a signed-in test client starts with
    #[must_use]
    pub fn tokens() -> TokenPair {
        TokenPair::new(TEST_ACCESS_TOKEN, TEST_REFRESH_TOKEN)
    }

    /// Live session warning in `warn_in` seconds and expiring in `expire_in`
    #[must_use]
    pub fn session_info(clock: &dyn Clock, warn_in: i64, expire_in: i64) -> SessionInfo {
        SessionInfoBuilder::new()
            .warn_in(warn_in)
            .expire_in(expire_in)
            .build(clock)
    }

    /// Session the server reports as already expired
    #[must_use]
    pub fn expired_session(clock: &dyn Clock) -> SessionInfo {
        SessionInfoBuilder::new()
            .warn_in(-120)
            .expire_in(0)
            .expired()
            .build(clock)
    }

    /// Live session the server wants refreshed
    #[must_use]
    pub fn refresh_requested(clock: &dyn Clock) -> SessionInfo {
        SessionInfoBuilder::new()
            .access_expires_in(30)
            .needs_refresh()
            .build(clock)
    }

    /// Successful extend carrying `generation` tokens and a fresh session
    #[must_use]
    pub fn extend_response(
        clock: &dyn Clock,
        generation: u32,
        warn_in: i64,
        expire_in: i64,
    ) -> ExtendResponse {
        SessionInfoBuilder::new()
            .warn_in(warn_in)
            .expire_in(expire_in)
            .build_extend(clock, generation)
    }

    /// Lifecycle timings used by most tests
    #[must_use]
    pub fn lifecycle_config() -> LifecycleConfig {
        LifecycleConfig::default()
    }

    /// Default settings pointed at the test base URL
    #[must_use]
    pub fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.api.base_url = TEST_BASE_URL.to_string();
        settings
    }
}
