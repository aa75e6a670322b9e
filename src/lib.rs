#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the tradelog-session crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod auth;
pub mod clock;
pub mod credentials;
pub mod models;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use api::{ApiError, AuthorizedClient, HttpSessionApi, SessionApi};
pub use auth::{AuthContext, AuthError};
pub use clock::{Clock, SystemClock};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use models::{LogoutReason, SessionInfo, SessionWarning, TokenPair, WarningKind};
pub use session::{SessionEvents, SessionLifecycleManager};
pub use settings::Settings;
