//! Session Lifecycle Module
//!
//! Client-side management of an authenticated session's lifetime: polling the
//! server for expiry information, refreshing tokens, warning ahead of expiry
//! and forcing a logout when the session ends.
//!
//! # Modules
//!
//! - [`manager`] - Public surface, `SessionLifecycleManager`
//! - [`lifecycle`] - Worker task running the state machine
//! - [`events`] - Presentation callbacks (`SessionEvents`)
//! - [`errors`] - Failure classification
//! - [`timer`] - Cancellable timers on the tokio clock

pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod manager;
pub(crate) mod timer;

// Re-export commonly used items for convenience
pub use errors::SessionFailure;
pub use events::{CallbackEvents, ChannelEvents, SessionEvent, SessionEvents};
pub use lifecycle::SessionPhase;
pub use manager::{LifecycleConfig, SessionLifecycleManager};
