//! Top-level auth context
//!
//! [`AuthContext`] ties sign-in to the session lifecycle. The view layer
//! mounts it once with its event sink; from then on a successful login, or
//! credentials restored from disk, start the lifecycle manager, and unmounting
//! stops it.

use crate::api::{ApiError, AuthApi};
use crate::credentials::{CredentialError, CredentialStore};
use crate::session::events::SessionEvents;
use crate::session::SessionLifecycleManager;
use log::info;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Failures of the sign-in surface
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("auth context is not mounted")]
    NotMounted,

    #[error(transparent)]
    Api(ApiError),

    #[error(transparent)]
    Storage(#[from] CredentialError),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => AuthError::InvalidCredentials,
            other => AuthError::Api(other),
        }
    }
}

/// Sign-in state shared by the application
pub struct AuthContext {
    auth_api: Arc<dyn AuthApi>,
    manager: Arc<SessionLifecycleManager>,
    events: Mutex<Option<Arc<dyn SessionEvents>>>,
}

impl AuthContext {
    #[must_use]
    pub fn new(auth_api: Arc<dyn AuthApi>, manager: Arc<SessionLifecycleManager>) -> Self {
        Self {
            auth_api,
            manager,
            events: Mutex::new(None),
        }
    }

    /// Register the view layer's sink and resume a stored session
    ///
    /// Returns whether stored credentials were found and the lifecycle
    /// manager started.
    pub async fn mount(&self, events: Arc<dyn SessionEvents>) -> bool {
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&events));

        if self.manager.credentials().get().is_none() {
            info!("No stored session to resume");
            return false;
        }

        info!("Resuming stored session");
        self.manager.initialize(events).await;
        true
    }

    /// Sign in and start the session lifecycle
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] when the server rejects the
    /// login, [`AuthError::NotMounted`] before [`AuthContext::mount`], or
    /// another variant if the request or the credential store fails.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let events = self.mounted_events()?;

        let tokens = self.auth_api.login(username.trim(), password).await?;
        self.manager.credentials().set(tokens)?;
        info!("Signed in as {}", username.trim());

        self.manager.initialize(events).await;
        Ok(())
    }

    /// Voluntary sign-out
    ///
    /// The manager stops, clears the credentials and revokes the session
    /// best-effort. No logout event is emitted; the caller asked for it.
    pub async fn logout(&self) {
        self.manager.sign_out().await;
        info!("Signed out");
    }

    /// Stop the session lifecycle, keeping the credentials
    pub async fn unmount(&self) {
        self.manager.stop().await;
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.manager.is_session_active()
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<SessionLifecycleManager> {
        &self.manager
    }

    fn mounted_events(&self) -> Result<Arc<dyn SessionEvents>, AuthError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AuthError::NotMounted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::session::{LifecycleConfig, SessionPhase};
    use crate::testing::constants::{TEST_PASSWORD, TEST_USERNAME};
    use crate::testing::{MockAuthApi, MockClock, MockSessionApi, RecordingEvents, TestFixtures};
    use std::time::Duration;

    struct Harness {
        api: Arc<MockSessionApi>,
        credentials: Arc<MemoryCredentialStore>,
        context: AuthContext,
    }

    fn harness(credentials: MemoryCredentialStore) -> Harness {
        let clock = Arc::new(MockClock::new());
        let api = Arc::new(MockSessionApi::new());
        api.push_info(Ok(TestFixtures::session_info(clock.as_ref(), 600, 900)));
        let credentials = Arc::new(credentials);
        let manager = Arc::new(SessionLifecycleManager::new(
            api.clone(),
            credentials.clone(),
            clock,
            LifecycleConfig::default(),
        ));
        let auth_api = Arc::new(MockAuthApi::new(
            TEST_USERNAME,
            TEST_PASSWORD,
            TestFixtures::tokens(),
        ));

        Harness {
            api,
            credentials,
            context: AuthContext::new(auth_api, manager),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_without_credentials_does_not_start() {
        let h = harness(MemoryCredentialStore::new());

        assert!(!h.context.mount(Arc::new(RecordingEvents::new())).await);
        assert_eq!(h.context.manager().phase(), SessionPhase::Stopped);
        assert_eq!(h.api.info_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_resumes_stored_session() {
        let h = harness(MemoryCredentialStore::with_tokens(TestFixtures::tokens()));

        assert!(h.context.mount(Arc::new(RecordingEvents::new())).await);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(h.context.is_authenticated());
        assert_eq!(h.api.info_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_stores_tokens_and_starts_manager() {
        let h = harness(MemoryCredentialStore::new());
        h.context.mount(Arc::new(RecordingEvents::new())).await;

        h.context.login(TEST_USERNAME, TEST_PASSWORD).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.credentials.get(), Some(TestFixtures::tokens()));
        assert!(h.context.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_rejections() {
        let h = harness(MemoryCredentialStore::new());

        assert!(matches!(
            h.context.login(TEST_USERNAME, TEST_PASSWORD).await,
            Err(AuthError::NotMounted)
        ));

        h.context.mount(Arc::new(RecordingEvents::new())).await;
        assert!(matches!(
            h.context.login(" ", TEST_PASSWORD).await,
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            h.context.login(TEST_USERNAME, "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(h.credentials.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_clears_without_event() {
        let h = harness(MemoryCredentialStore::with_tokens(TestFixtures::tokens()));
        let events = Arc::new(RecordingEvents::new());
        h.context.mount(events.clone()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.context.logout().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!h.context.is_authenticated());
        assert!(h.credentials.get().is_none());
        assert_eq!(h.api.revoke_calls(), 1);
        assert!(events.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_keeps_credentials() {
        let h = harness(MemoryCredentialStore::with_tokens(TestFixtures::tokens()));
        h.context.mount(Arc::new(RecordingEvents::new())).await;

        h.context.unmount().await;

        assert_eq!(h.context.manager().phase(), SessionPhase::Stopped);
        assert!(h.credentials.get().is_some());
    }
}
