//! Remote API access
//!
//! - [`client`] - session endpoints (`SessionApi`, `AuthApi`) over reqwest
//! - [`authorized`] - bearer-authenticated requests for the rest of the app
//! - [`errors`] - transport error classification

pub mod authorized;
pub mod client;
pub mod errors;

pub use authorized::AuthorizedClient;
pub use client::{AuthApi, HttpSessionApi, SessionApi};
pub use errors::ApiError;
