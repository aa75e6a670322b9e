//! Session lifecycle worker - the state machine behind `SessionLifecycleManager`
//!
//! One worker task exists per active run and it alone owns the current
//! [`SessionInfo`] and every timer. Its select loop handles exactly one event
//! at a time (control command, network completion, or timer) and runs it to
//! completion, so no handler ever observes a half-updated state.
//!
//! Network calls never block the loop. Polls, refreshes and revocations are
//! spawned as separate tasks; poll and refresh results come back through the
//! completion channel and re-enter the state machine there.
//!
//! ```text
//!   Stopped --initialize--> Polling --warning timer--> WarningArmed
//!                             ^  |                          |
//!                             |  +-- expired / 401 / refresh failure / logout timer
//!                             |  v                          v
//!                 accept info +-- LoggingOut <-- countdown zero / logout timer
//!                                    |
//!                                    v
//!                                 Stopped
//! ```

use crate::api::{ApiError, SessionApi};
use crate::clock::Clock;
use crate::credentials::CredentialStore;
use crate::models::{ExtendResponse, LogoutReason, SessionInfo, SessionWarning, TokenPair};
use crate::session::errors::SessionFailure;
use crate::session::events::SessionEvents;
use crate::session::manager::LifecycleConfig;
use crate::session::timer::{Ticker, TimerSlot};
use crate::utils::logging::LoggingHelper;
use log::{debug, error, info, warn};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// State of the lifecycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Stopped,
    Polling,
    WarningArmed,
    LoggingOut,
}

/// Snapshot published by the worker for `is_session_active`
#[derive(Debug, Clone)]
pub(crate) struct SessionStatus {
    pub(crate) active: bool,
    pub(crate) phase: SessionPhase,
    pub(crate) info: Option<SessionInfo>,
}

impl SessionStatus {
    pub(crate) const fn stopped() -> Self {
        Self {
            active: false,
            phase: SessionPhase::Stopped,
            info: None,
        }
    }
}

/// Control requests from the manager's public surface
pub(crate) enum Command {
    Extend(oneshot::Sender<bool>),
    ForceLogout(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

/// Results of spawned network calls
enum Completion {
    Poll {
        epoch: u64,
        result: Result<SessionInfo, ApiError>,
    },
    Refresh {
        result: Result<ExtendResponse, ApiError>,
    },
}

/// What triggered a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOrigin {
    /// The server flagged `needs_refresh` on a poll
    Poll,
    /// `extend_session` was called
    Manual,
}

impl fmt::Display for RefreshOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOrigin::Poll => write!(f, "poll"),
            RefreshOrigin::Manual => write!(f, "manual"),
        }
    }
}

struct RefreshInFlight {
    origin: RefreshOrigin,
    task: JoinHandle<()>,
    waiters: Vec<oneshot::Sender<bool>>,
}

/// Collaborators handed to each run
pub(crate) struct WorkerContext {
    pub(crate) api: Arc<dyn SessionApi>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: Arc<dyn SessionEvents>,
    pub(crate) config: LifecycleConfig,
    pub(crate) status: Arc<watch::Sender<SessionStatus>>,
}

pub(crate) struct LifecycleWorker {
    ctx: WorkerContext,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,

    phase: SessionPhase,
    current: Option<SessionInfo>,

    poll_ticker: Ticker,
    warning_timer: TimerSlot,
    logout_timer: TimerSlot,
    display_ticker: Ticker,

    poll_task: Option<JoinHandle<()>>,
    refresh: Option<RefreshInFlight>,
    // Bumped on every refresh start; polls dispatched under an older epoch are stale
    refresh_epoch: u64,
}

impl LifecycleWorker {
    pub(crate) fn new(ctx: WorkerContext, commands: mpsc::Receiver<Command>) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let poll_ticker = Ticker::new(ctx.config.poll_interval);
        let display_ticker = Ticker::new(ctx.config.display_tick);

        Self {
            ctx,
            commands,
            completions_tx,
            completions,
            phase: SessionPhase::Stopped,
            current: None,
            poll_ticker,
            warning_timer: TimerSlot::new("warning"),
            logout_timer: TimerSlot::new("logout"),
            display_ticker,
            poll_task: None,
            refresh: None,
            refresh_epoch: 0,
        }
    }

    /// Drive the state machine until stop or forced logout
    pub(crate) async fn run(mut self) {
        info!(
            "Session lifecycle started (poll every {}s)",
            self.ctx.config.poll_interval.as_secs()
        );
        self.set_phase(SessionPhase::Polling);
        self.poll_ticker.start(Duration::ZERO);

        loop {
            // Biased: control commands win over timers, and the logout timer
            // wins over the display countdown when both are due.
            let flow = tokio::select! {
                biased;
                command = self.commands.recv() => self.handle_command(command),
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                () = self.logout_timer.fired() => self.on_logout_timer(),
                () = self.display_ticker.tick() => self.on_display_tick(),
                () = self.warning_timer.fired() => self.on_warning_timer(),
                () = self.poll_ticker.tick() => self.on_poll_tick(),
            };

            if flow.is_break() {
                break;
            }
        }

        debug!("Session lifecycle worker exited");
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    fn handle_command(&mut self, command: Option<Command>) -> ControlFlow<()> {
        match command {
            Some(Command::Extend(reply)) => self.request_refresh(RefreshOrigin::Manual, Some(reply)),
            Some(Command::ForceLogout(reply)) => {
                self.logout(LogoutReason::Forced);
                let _ = reply.send(());
                ControlFlow::Break(())
            }
            Some(Command::Stop(reply)) => {
                self.teardown();
                let _ = reply.send(());
                ControlFlow::Break(())
            }
            None => {
                // The manager was dropped
                self.teardown();
                ControlFlow::Break(())
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) -> ControlFlow<()> {
        match completion {
            Completion::Poll { epoch, result } => self.on_poll_completed(epoch, result),
            Completion::Refresh { result } => self.on_refresh_completed(result),
        }
    }

    // -------------------------------------------------------------------------
    // Polling
    // -------------------------------------------------------------------------

    fn on_poll_tick(&mut self) -> ControlFlow<()> {
        if self.poll_task.is_some() {
            debug!("Previous session poll still in flight, skipping tick");
            return ControlFlow::Continue(());
        }
        if self.refresh.is_some() {
            debug!("Session refresh in flight, skipping poll");
            return ControlFlow::Continue(());
        }

        let Some(tokens) = self.ctx.credentials.get() else {
            warn!("No stored credentials, cannot poll session");
            return self.fail(SessionFailure::Unauthorized);
        };

        let epoch = self.refresh_epoch;
        let api = Arc::clone(&self.ctx.api);
        let completions = self.completions_tx.clone();
        self.poll_task = Some(tokio::spawn(async move {
            let result = api.fetch_session_info(&tokens.access_token).await;
            let _ = completions.send(Completion::Poll { epoch, result });
        }));

        ControlFlow::Continue(())
    }

    fn on_poll_completed(
        &mut self,
        epoch: u64,
        result: Result<SessionInfo, ApiError>,
    ) -> ControlFlow<()> {
        self.poll_task = None;

        if self.refresh.is_some() || epoch != self.refresh_epoch {
            debug!("Discarding session poll result superseded by a refresh");
            return ControlFlow::Continue(());
        }

        match result {
            Ok(info) if info.is_expired => {
                info!("Server reports the session as expired");
                self.logout(LogoutReason::SessionExpired);
                ControlFlow::Break(())
            }
            Ok(info) if info.needs_refresh => {
                debug!(
                    "Server requests a token refresh ({}s of session left)",
                    info.time_remaining
                );
                self.request_refresh(RefreshOrigin::Poll, None)
            }
            Ok(info) => {
                self.accept(info);
                ControlFlow::Continue(())
            }
            Err(err) => self.fail(SessionFailure::from_poll_error(err)),
        }
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Start a refresh, or join the one already in flight
    fn request_refresh(
        &mut self,
        origin: RefreshOrigin,
        waiter: Option<oneshot::Sender<bool>>,
    ) -> ControlFlow<()> {
        if let Some(in_flight) = self.refresh.as_mut() {
            debug!(
                "Coalescing {origin} refresh into in-flight {} refresh",
                in_flight.origin
            );
            in_flight.waiters.extend(waiter);
            return ControlFlow::Continue(());
        }

        let Some(tokens) = self.ctx.credentials.get() else {
            warn!("No stored credentials, cannot refresh session");
            let flow = self.fail(SessionFailure::RefreshFailure(ApiError::Unauthorized));
            if let Some(waiter) = waiter {
                let _ = waiter.send(false);
            }
            return flow;
        };

        LoggingHelper::log_refresh_start(origin);
        self.refresh_epoch += 1;

        let retry = RetryPolicy {
            extra_attempts: self.ctx.config.refresh_retry_attempts,
            delay: self.ctx.config.refresh_retry_delay,
            session_deadline: self.current.as_ref().map(|info| info.session_expires_at),
        };
        let task = tokio::spawn(refresh_with_retry(
            Arc::clone(&self.ctx.api),
            Arc::clone(&self.ctx.clock),
            tokens,
            retry,
            self.completions_tx.clone(),
        ));

        self.refresh = Some(RefreshInFlight {
            origin,
            task,
            waiters: waiter.into_iter().collect(),
        });
        ControlFlow::Continue(())
    }

    fn on_refresh_completed(&mut self, result: Result<ExtendResponse, ApiError>) -> ControlFlow<()> {
        let Some(in_flight) = self.refresh.take() else {
            debug!("Ignoring refresh result with no refresh in flight");
            return ControlFlow::Continue(());
        };

        let (succeeded, flow) = match result {
            Ok(response) => self.apply_refresh(response),
            Err(err) => (false, self.fail(SessionFailure::from_refresh_error(err))),
        };

        for waiter in in_flight.waiters {
            let _ = waiter.send(succeeded);
        }
        flow
    }

    fn apply_refresh(&mut self, response: ExtendResponse) -> (bool, ControlFlow<()>) {
        if let Err(e) = self.ctx.credentials.set(response.tokens()) {
            // The old refresh token is already rotated away; nothing left to renew with
            error!("Failed to store refreshed credentials: {e}");
            self.logout(LogoutReason::RefreshFailed);
            return (false, ControlFlow::Break(()));
        }

        let info = response.session_info;
        if info.is_expired {
            info!("Refresh returned an already expired session");
            self.logout(LogoutReason::SessionExpired);
            return (false, ControlFlow::Break(()));
        }

        info!("Session refreshed");
        self.accept(info);
        (true, ControlFlow::Continue(()))
    }

    // -------------------------------------------------------------------------
    // Scheduling
    // -------------------------------------------------------------------------

    /// Make `info` current and rebuild the warning/logout timers from it
    fn accept(&mut self, info: SessionInfo) {
        let now = self.ctx.clock.now();
        LoggingHelper::log_session_accepted(&info, now);

        // Cancel first so no timer derived from the old info can fire later
        self.warning_timer.cancel();
        self.logout_timer.cancel();

        let warning_pending = info.auto_logout_warning_at > now;
        if self.display_ticker.is_running() && warning_pending {
            debug!("Session extended past its warning point, withdrawing warning");
            self.display_ticker.stop();
            self.ctx.events.on_warning_withdrawn();
        }

        self.logout_timer
            .arm(self.ctx.clock.until(info.session_expires_at));
        if self.display_ticker.is_running() {
            // Warning already on screen; the countdown continues against the new info
            self.set_phase(SessionPhase::WarningArmed);
        } else {
            self.warning_timer
                .arm(self.ctx.clock.until(info.auto_logout_warning_at));
            self.set_phase(SessionPhase::Polling);
        }

        self.current = Some(info);
        self.publish(true);
    }

    fn on_warning_timer(&mut self) -> ControlFlow<()> {
        let Some(info) = self.current.as_ref() else {
            return ControlFlow::Continue(());
        };
        let remaining = info.remaining_at(self.ctx.clock.now());
        if remaining <= 0 {
            return self.countdown_elapsed();
        }

        let warning = SessionWarning::from_remaining(remaining, self.critical_threshold_secs());
        LoggingHelper::log_warning(&warning);
        self.set_phase(SessionPhase::WarningArmed);
        self.ctx.events.on_warning(&warning);
        self.display_ticker.start(self.ctx.config.display_tick);

        ControlFlow::Continue(())
    }

    fn on_display_tick(&mut self) -> ControlFlow<()> {
        let Some(info) = self.current.as_ref() else {
            self.display_ticker.stop();
            return ControlFlow::Continue(());
        };
        let remaining = info.remaining_at(self.ctx.clock.now());
        if remaining <= 0 {
            return self.countdown_elapsed();
        }

        let warning = SessionWarning::from_remaining(remaining, self.critical_threshold_secs());
        self.ctx.events.on_warning(&warning);
        ControlFlow::Continue(())
    }

    /// The local countdown hit zero; do not wait for the logout timer
    fn countdown_elapsed(&mut self) -> ControlFlow<()> {
        self.ctx.events.on_warning(&SessionWarning::expired());
        self.fail(SessionFailure::ClockDrift)
    }

    fn on_logout_timer(&mut self) -> ControlFlow<()> {
        info!("Session expiry reached");
        self.logout(LogoutReason::Timeout);
        ControlFlow::Break(())
    }

    // -------------------------------------------------------------------------
    // Termination
    // -------------------------------------------------------------------------

    /// Log a failure and force a logout when it is fatal
    fn fail(&mut self, failure: SessionFailure) -> ControlFlow<()> {
        LoggingHelper::log_session_failure(&failure);
        match failure.logout_reason() {
            Some(reason) => {
                self.logout(reason);
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    }

    /// The `LoggingOut` transition: cancel, clear, revoke, notify, stop
    fn logout(&mut self, reason: LogoutReason) {
        self.set_phase(SessionPhase::LoggingOut);
        LoggingHelper::log_logout(reason);

        self.cancel_all();

        let tokens = self.ctx.credentials.get();
        if let Err(e) = self.ctx.credentials.clear() {
            error!("Failed to clear credentials during logout: {e}");
        }
        if let Some(tokens) = tokens {
            spawn_revoke(Arc::clone(&self.ctx.api), tokens);
        }

        self.ctx.events.on_logout(reason);

        self.current = None;
        self.phase = SessionPhase::Stopped;
        self.publish(false);
    }

    /// Voluntary stop: cancel everything without notifying the view layer
    fn teardown(&mut self) {
        self.cancel_all();
        self.current = None;
        self.phase = SessionPhase::Stopped;
        self.publish(false);
        info!("Session lifecycle stopped");
    }

    fn cancel_all(&mut self) {
        self.poll_ticker.stop();
        self.warning_timer.cancel();
        self.logout_timer.cancel();
        self.display_ticker.stop();

        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some(in_flight) = self.refresh.take() {
            // Dropped waiters observe the refresh as failed
            in_flight.task.abort();
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn critical_threshold_secs(&self) -> i64 {
        i64::try_from(self.ctx.config.critical_threshold.as_secs()).unwrap_or(i64::MAX)
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!("Session phase {:?} -> {phase:?}", self.phase);
            self.phase = phase;
        }
        let active = phase != SessionPhase::Stopped;
        self.publish(active);
    }

    fn publish(&self, active: bool) {
        self.ctx.status.send_replace(SessionStatus {
            active,
            phase: self.phase,
            info: self.current.clone(),
        });
    }
}

/// Bounded retry for refreshes that fail on the network
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    extra_attempts: u32,
    delay: Duration,
    session_deadline: Option<chrono::DateTime<chrono::Utc>>,
}

impl RetryPolicy {
    fn allows_retry(&self, attempt: u32, err: &ApiError, clock: &dyn Clock) -> bool {
        if !err.is_transient() || attempt >= self.extra_attempts {
            return false;
        }
        // A retry that lands after the session ends is pointless
        let delay = chrono::Duration::from_std(self.delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.session_deadline
            .map_or(true, |deadline| clock.now() + delay < deadline)
    }
}

async fn refresh_with_retry(
    api: Arc<dyn SessionApi>,
    clock: Arc<dyn Clock>,
    tokens: TokenPair,
    policy: RetryPolicy,
    completions: mpsc::UnboundedSender<Completion>,
) {
    let mut attempt = 0;
    let result = loop {
        match api.extend_session(&tokens).await {
            Ok(response) => break Ok(response),
            Err(err) if policy.allows_retry(attempt, &err, clock.as_ref()) => {
                attempt += 1;
                warn!(
                    "Session refresh attempt {attempt} failed: {err}; retrying in {}ms",
                    policy.delay.as_millis()
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => break Err(err),
        }
    };

    let _ = completions.send(Completion::Refresh { result });
}

/// Fire-and-forget server-side revocation
pub(crate) fn spawn_revoke(api: Arc<dyn SessionApi>, tokens: TokenPair) {
    tokio::spawn(async move {
        match api.revoke_session(&tokens).await {
            Ok(()) => debug!("Session revoked server-side"),
            Err(e) => warn!("Best-effort session revoke failed: {e}"),
        }
    });
}
