//! Unified testing utilities for the session lifecycle
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built test data (tokens, sessions, settings)
//! - [`builders`] - Fluent builder for server session snapshots
//! - [`mock`] - Scripted API, virtual wall clock and recording event sink
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tradelog_session::testing::{MockClock, MockSessionApi, TestFixtures};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_with_scripted_server() {
//!     let clock = Arc::new(MockClock::new());
//!     let api = Arc::new(MockSessionApi::new());
//!     api.push_info(Ok(TestFixtures::session_info(clock.as_ref(), 60, 120)));
//!     // Build a manager around `api` and `clock`...
//! }
//! ```

pub mod builders;
pub mod fixtures;
pub mod mock;

// Re-export commonly used items for convenience
pub use builders::SessionInfoBuilder;
pub use fixtures::TestFixtures;
pub use mock::{MockAuthApi, MockClock, MockSessionApi, RecordingEvents};

/// Common test constants
pub mod constants {
    /// Access token of a freshly signed-in test client
    pub const TEST_ACCESS_TOKEN: &str = "access-0";

    /// Refresh token of a freshly signed-in test client
    pub const TEST_REFRESH_TOKEN: &str = "refresh-0";

    /// Base URL that never resolves to a real server
    pub const TEST_BASE_URL: &str = "http://127.0.0.1:9/api/";

    /// Credentials accepted by `MockAuthApi` in tests
    pub const TEST_USERNAME: &str = "trader@example.com";
    pub const TEST_PASSWORD: &str = "correct horse battery staple";
}
