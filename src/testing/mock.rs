//! Mock objects and fake implementations for testing
//!
//! Scripted stand-ins for the server API, the wall clock and the view layer,
//! so the lifecycle state machine can be driven under tokio's paused time.

use crate::api::{ApiError, AuthApi, SessionApi};
use crate::clock::Clock;
use crate::models::{ExtendResponse, LogoutReason, SessionInfo, SessionWarning, TokenPair};
use crate::session::events::{SessionEvent, SessionEvents};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Wall clock that follows tokio's (pausable) clock
///
/// `now()` is a fixed epoch plus the tokio time elapsed since construction,
/// plus an adjustable skew. A positive skew makes the wall clock run ahead of
/// the timers, which is how clock drift is simulated.
pub struct MockClock {
    epoch: DateTime<Utc>,
    anchor: Instant,
    skew: Mutex<chrono::Duration>,
}

impl MockClock {
    /// # Panics
    ///
    /// Never in practice; the epoch is a valid constant date.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
            anchor: Instant::now(),
            skew: Mutex::new(chrono::Duration::zero()),
        }
    }

    /// Shift the wall clock relative to the tokio clock
    ///
    /// # Panics
    ///
    /// Panics if the skew lock is poisoned.
    pub fn set_skew(&self, skew: chrono::Duration) {
        *self.skew.lock().unwrap() = skew;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let skew = *self.skew.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.epoch + elapsed + skew
    }
}

/// Queue of scripted results; the last one repeats once the queue drains
struct Script<T> {
    queue: VecDeque<Result<T, ApiError>>,
    last: Option<Result<T, ApiError>>,
}

impl<T: Clone> Script<T> {
    const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last: None,
        }
    }

    fn push(&mut self, result: Result<T, ApiError>) {
        self.queue.push_back(result);
    }

    fn next(&mut self) -> Result<T, ApiError> {
        if let Some(result) = self.queue.pop_front() {
            self.last = Some(result.clone());
            return result;
        }
        self.last
            .clone()
            .unwrap_or_else(|| Err(ApiError::Network("no scripted response".to_string())))
    }
}

/// Scripted [`SessionApi`] with call counters
pub struct MockSessionApi {
    info: Mutex<Script<SessionInfo>>,
    extend: Mutex<Script<ExtendResponse>>,
    revoke: Mutex<Result<(), ApiError>>,
    latency: Mutex<Duration>,
    info_calls: AtomicUsize,
    extend_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    seen_access_tokens: Mutex<Vec<String>>,
}

impl MockSessionApi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            info: Mutex::new(Script::new()),
            extend: Mutex::new(Script::new()),
            revoke: Mutex::new(Ok(())),
            latency: Mutex::new(Duration::ZERO),
            info_calls: AtomicUsize::new(0),
            extend_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            seen_access_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Queue the result of the next `fetch_session_info`
    ///
    /// # Panics
    ///
    /// Panics if the script lock is poisoned.
    pub fn push_info(&self, result: Result<SessionInfo, ApiError>) {
        self.info.lock().unwrap().push(result);
    }

    /// Queue the result of the next `extend_session`
    ///
    /// # Panics
    ///
    /// Panics if the script lock is poisoned.
    pub fn push_extend(&self, result: Result<ExtendResponse, ApiError>) {
        self.extend.lock().unwrap().push(result);
    }

    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn set_revoke_result(&self, result: Result<(), ApiError>) {
        *self.revoke.lock().unwrap() = result;
    }

    /// Delay every call by `latency` of tokio time
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    #[must_use]
    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn extend_calls(&self) -> usize {
        self.extend_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    /// Access tokens presented to `fetch_session_info`, in call order
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn seen_access_tokens(&self) -> Vec<String> {
        self.seen_access_tokens.lock().unwrap().clone()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockSessionApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionApi for MockSessionApi {
    async fn fetch_session_info(&self, access_token: &str) -> Result<SessionInfo, ApiError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_access_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        let result = self.info.lock().unwrap().next();
        self.simulate_latency().await;
        result
    }

    async fn extend_session(&self, _tokens: &TokenPair) -> Result<ExtendResponse, ApiError> {
        self.extend_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.extend.lock().unwrap().next();
        self.simulate_latency().await;
        result
    }

    async fn revoke_session(&self, _tokens: &TokenPair) -> Result<(), ApiError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.revoke.lock().unwrap().clone()
    }
}

/// [`AuthApi`] accepting a single username/password pair
pub struct MockAuthApi {
    username: String,
    password: String,
    tokens: TokenPair,
}

impl MockAuthApi {
    #[must_use]
    pub fn new(username: &str, password: &str, tokens: TokenPair) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        if username == self.username && password == self.password {
            Ok(self.tokens.clone())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// [`SessionEvents`] sink that records everything it receives
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<SessionWarning> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Warning(warning) => Some(warning),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn logouts(&self) -> Vec<LogoutReason> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Logout(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }

    /// How many times a displayed warning was withdrawn
    #[must_use]
    pub fn withdrawals(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == SessionEvent::WarningWithdrawn)
            .count()
    }
}

impl SessionEvents for RecordingEvents {
    fn on_warning(&self, warning: &SessionWarning) {
        self.events
            .lock()
            .unwrap()
            .push(SessionEvent::Warning(warning.clone()));
    }

    fn on_logout(&self, reason: LogoutReason) {
        self.events.lock().unwrap().push(SessionEvent::Logout(reason));
    }

    fn on_warning_withdrawn(&self) {
        self.events
            .lock()
            .unwrap()
            .push(SessionEvent::WarningWithdrawn);
    }
}
