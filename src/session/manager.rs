//! Session Lifecycle Manager - client-side session expiry handling
//!
//! `SessionLifecycleManager` is the single owner of "is this client still
//! signed in". It polls the server for the authoritative [`SessionInfo`],
//! refreshes tokens when the server asks for it, warns the view layer ahead of
//! expiry and forces a logout when the session ends.
//!
//! ## Organization
//!
//! 1. **Configuration** - `LifecycleConfig` timings
//! 2. **Construction** - collaborators are injected, nothing is global
//! 3. **Control** - `initialize`, `stop`, `extend_session`, `force_logout`
//! 4. **Queries** - `is_session_active` and friends
//! 5. **Tests**
//!
//! All state lives in a worker task spawned by `initialize` (see
//! [`lifecycle`](crate::session::lifecycle)); the methods here only send it
//! commands or read the status it publishes.

use crate::api::SessionApi;
use crate::clock::Clock;
use crate::credentials::CredentialStore;
use crate::models::{LogoutReason, SessionInfo};
use crate::session::events::SessionEvents;
use crate::session::lifecycle::{
    spawn_revoke, Command, LifecycleWorker, SessionPhase, SessionStatus, WorkerContext,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

// =============================================================================
// Configuration
// =============================================================================

/// Timings of the lifecycle state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Period of the session-info poll
    pub poll_interval: Duration,
    /// Below this many seconds remaining a warning is critical
    pub critical_threshold: Duration,
    /// Period of the countdown updates while a warning is shown
    pub display_tick: Duration,
    /// Extra refresh attempts after a network failure
    pub refresh_retry_attempts: u32,
    /// Pause before each extra refresh attempt
    pub refresh_retry_delay: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            critical_threshold: Duration::from_secs(60),
            display_tick: Duration::from_secs(1),
            refresh_retry_attempts: 1,
            refresh_retry_delay: Duration::from_secs(2),
        }
    }
}

impl LifecycleConfig {
    /// Copy with zero periods raised to the shortest tick the worker runs
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for (name, period) in [
            ("poll_interval", &mut self.poll_interval),
            ("display_tick", &mut self.display_tick),
        ] {
            if period.is_zero() {
                warn!("Lifecycle {name} of zero raised to {MIN_PERIOD:?}");
                *period = MIN_PERIOD;
            }
        }
        self
    }
}

// Periodic timers cannot run with a zero period
const MIN_PERIOD: Duration = Duration::from_millis(1);

// Depth of the command queue between the public surface and the worker
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Handle to the worker of the current run
struct ActiveRun {
    commands: mpsc::Sender<Command>,
    worker: JoinHandle<()>,
    events: Arc<dyn SessionEvents>,
}

// =============================================================================
// Construction
// =============================================================================

/// Owner of the client session lifecycle
pub struct SessionLifecycleManager {
    api: Arc<dyn SessionApi>,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    status: Arc<watch::Sender<SessionStatus>>,
    run: Mutex<Option<ActiveRun>>,
}

impl SessionLifecycleManager {
    #[must_use]
    pub fn new(
        api: Arc<dyn SessionApi>,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::stopped());
        Self {
            api,
            credentials,
            clock,
            config: config.normalized(),
            status: Arc::new(status),
            run: Mutex::new(None),
        }
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Start managing the session, reporting to `events`
    ///
    /// Calling this while a run is active stops that run first (without a
    /// logout notification), so at most one worker ever exists. The first
    /// poll is issued immediately.
    pub async fn initialize(&self, events: Arc<dyn SessionEvents>) {
        let mut run = self.run.lock().await;
        if let Some(previous) = run.take() {
            debug!("Re-initializing: stopping previous session run");
            shutdown(previous).await;
        }

        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let worker = LifecycleWorker::new(
            WorkerContext {
                api: Arc::clone(&self.api),
                credentials: Arc::clone(&self.credentials),
                clock: Arc::clone(&self.clock),
                events: Arc::clone(&events),
                config: self.config.clone(),
                status: Arc::clone(&self.status),
            },
            receiver,
        );

        *run = Some(ActiveRun {
            commands,
            worker: tokio::spawn(worker.run()),
            events,
        });
    }

    /// Stop all timers and polling; idempotent
    ///
    /// Credentials are left untouched and no logout is reported.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        self.stop_locked(&mut run).await;
    }

    /// Voluntary sign-out: stop, clear the credentials and revoke
    ///
    /// Unlike [`force_logout`](Self::force_logout) no logout is reported, the
    /// caller asked for it.
    pub async fn sign_out(&self) {
        let mut run = self.run.lock().await;
        self.stop_locked(&mut run).await;

        let tokens = self.credentials.get();
        if let Err(e) = self.credentials.clear() {
            error!("Failed to clear credentials on sign-out: {e}");
        }
        if let Some(tokens) = tokens {
            spawn_revoke(Arc::clone(&self.api), tokens);
        }
    }

    // Caller holds the run lock across the shutdown and the status publish
    async fn stop_locked(&self, run: &mut Option<ActiveRun>) {
        if let Some(previous) = run.take() {
            shutdown(previous).await;
        }
        self.status.send_replace(SessionStatus::stopped());
    }

    /// Ask the server to extend the session
    ///
    /// Returns `true` once fresh credentials and session info are in place.
    /// Joins a refresh that is already in flight rather than starting another.
    /// Failure forces a `RefreshFailed` logout and returns `false`, as does
    /// calling this while stopped.
    pub async fn extend_session(&self) -> bool {
        let (reply, response) = oneshot::channel();
        {
            let run = self.run.lock().await;
            let Some(active) = run.as_ref() else {
                debug!("extend_session called with no active session run");
                return false;
            };
            if active.commands.send(Command::Extend(reply)).await.is_err() {
                debug!("extend_session called after the session run ended");
                return false;
            }
        }
        // A worker torn down mid-refresh drops the reply sender
        response.await.unwrap_or(false)
    }

    /// End the session now with reason `Forced`
    ///
    /// Used when some other part of the application learns the session is
    /// dead (e.g. a 401 on an unrelated request). Credentials are cleared even
    /// when the manager is not running.
    pub async fn force_logout(&self) {
        let run = self.run.lock().await;

        if let Some(active) = run.as_ref() {
            let (reply, done) = oneshot::channel();
            if active.commands.send(Command::ForceLogout(reply)).await.is_ok() && done.await.is_ok()
            {
                return;
            }
        }

        // No live worker: perform the logout side effects directly
        let tokens = self.credentials.get();
        if let Err(e) = self.credentials.clear() {
            error!("Failed to clear credentials during forced logout: {e}");
        }
        let Some(tokens) = tokens else {
            debug!("force_logout with no stored credentials, nothing to do");
            return;
        };

        info!("🚪 Logging out: {}", LogoutReason::Forced);
        spawn_revoke(Arc::clone(&self.api), tokens);
        if let Some(ended) = run.as_ref() {
            ended.events.on_logout(LogoutReason::Forced);
        } else {
            warn!("Forced logout with no event sink registered");
        }
        self.status.send_replace(SessionStatus::stopped());
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether the manager is running with a current, unexpired session
    #[must_use]
    pub fn is_session_active(&self) -> bool {
        let status = self.status.borrow();
        status.active
            && status
                .info
                .as_ref()
                .is_some_and(|info| !info.is_expired_at(self.clock.now()))
    }

    /// Current state machine phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.status.borrow().phase
    }

    /// Most recently accepted session info, if any
    #[must_use]
    pub fn current_session(&self) -> Option<SessionInfo> {
        self.status.borrow().info.clone()
    }

    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }
}

impl Drop for SessionLifecycleManager {
    fn drop(&mut self) {
        // Closing the command channel stops the worker; abort covers a worker
        // parked on an in-flight command reply
        if let Some(active) = self.run.get_mut().take() {
            active.worker.abort();
        }
    }
}

/// Stop a run and wait for its worker to exit
async fn shutdown(run: ActiveRun) {
    let (reply, done) = oneshot::channel();
    if run.commands.send(Command::Stop(reply)).await.is_ok() {
        let _ = done.await;
    }
    if let Err(e) = run.worker.await {
        if !e.is_cancelled() {
            error!("Session lifecycle worker panicked: {e}");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::testing::{MockClock, MockSessionApi, RecordingEvents, TestFixtures};

    fn manager_with(
        api: &Arc<MockSessionApi>,
        credentials: &Arc<MemoryCredentialStore>,
        clock: &Arc<MockClock>,
    ) -> SessionLifecycleManager {
        SessionLifecycleManager::new(
            api.clone(),
            credentials.clone(),
            clock.clone(),
            LifecycleConfig::default(),
        )
    }

    #[test]
    fn test_default_config() {
        let config = LifecycleConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.critical_threshold, Duration::from_secs(60));
        assert_eq!(config.display_tick, Duration::from_secs(1));
        assert_eq!(config.refresh_retry_attempts, 1);
        assert_eq!(config.refresh_retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_zero_periods_are_raised() {
        let manager = SessionLifecycleManager::new(
            Arc::new(MockSessionApi::new()),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MockClock::new()),
            LifecycleConfig {
                poll_interval: Duration::ZERO,
                display_tick: Duration::ZERO,
                ..LifecycleConfig::default()
            },
        );

        assert_eq!(manager.config().poll_interval, MIN_PERIOD);
        assert_eq!(manager.config().display_tick, MIN_PERIOD);
        assert_eq!(
            manager.config().refresh_retry_delay,
            LifecycleConfig::default().refresh_retry_delay
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_clears_and_revokes_silently() {
        let clock = Arc::new(MockClock::new());
        let api = Arc::new(MockSessionApi::new());
        api.push_info(Ok(TestFixtures::session_info(clock.as_ref(), 600, 900)));
        let credentials = Arc::new(MemoryCredentialStore::with_tokens(TestFixtures::tokens()));
        let events = Arc::new(RecordingEvents::new());

        let manager = manager_with(&api, &credentials, &clock);
        manager.initialize(events.clone()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.sign_out().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(credentials.get().is_none());
        assert_eq!(api.revoke_calls(), 1);
        assert_eq!(manager.phase(), SessionPhase::Stopped);

        // A later forced logout finds nothing to do and reports nothing
        manager.force_logout().await;
        assert!(events.events().is_empty());
        assert_eq!(api.revoke_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_active_before_initialize() {
        let manager = manager_with(
            &Arc::new(MockSessionApi::new()),
            &Arc::new(MemoryCredentialStore::new()),
            &Arc::new(MockClock::new()),
        );
        assert!(!manager.is_session_active());
        assert_eq!(manager.phase(), SessionPhase::Stopped);
        assert!(manager.current_session().is_none());
        assert!(!manager.extend_session().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_keeps_credentials() {
        let clock = Arc::new(MockClock::new());
        let api = Arc::new(MockSessionApi::new());
        api.push_info(Ok(TestFixtures::session_info(clock.as_ref(), 600, 900)));
        let credentials = Arc::new(MemoryCredentialStore::with_tokens(TestFixtures::tokens()));
        let events = Arc::new(RecordingEvents::new());

        let manager = manager_with(&api, &credentials, &clock);
        manager.initialize(events.clone()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(manager.is_session_active());
        assert_eq!(manager.phase(), SessionPhase::Polling);

        manager.stop().await;
        manager.stop().await;

        assert!(!manager.is_session_active());
        assert_eq!(manager.phase(), SessionPhase::Stopped);
        assert!(credentials.get().is_some());
        assert!(events.logouts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_logout_when_stopped_clears_credentials() {
        let clock = Arc::new(MockClock::new());
        let api = Arc::new(MockSessionApi::new());
        let credentials = Arc::new(MemoryCredentialStore::with_tokens(TestFixtures::tokens()));
        let manager = manager_with(&api, &credentials, &clock);

        manager.force_logout().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(credentials.get().is_none());
        assert_eq!(api.revoke_calls(), 1);
    }
}
