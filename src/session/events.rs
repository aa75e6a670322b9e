//! Presentation callbacks
//!
//! The manager knows nothing about the UI. It reports through a
//! [`SessionEvents`] sink injected at `initialize` time. Sinks are invoked on
//! the manager's own task and must return quickly; in particular they must not
//! wait on the manager (spawn a task to call `extend_session` instead).

use crate::models::{LogoutReason, SessionWarning};
use log::debug;
use tokio::sync::mpsc;

/// Sink for warning and logout notifications
pub trait SessionEvents: Send + Sync {
    /// A warning should be shown, or its countdown updated
    fn on_warning(&self, warning: &SessionWarning);

    /// The session was ended by the manager; credentials are already cleared
    fn on_logout(&self, reason: LogoutReason);

    /// The session was extended past its warning point while a warning was
    /// shown; the view should dismiss it. No further countdown updates follow.
    fn on_warning_withdrawn(&self) {}
}

/// Closure-backed sink
pub struct CallbackEvents<W, L> {
    on_warning: W,
    on_logout: L,
}

impl<W, L> CallbackEvents<W, L>
where
    W: Fn(&SessionWarning) + Send + Sync,
    L: Fn(LogoutReason) + Send + Sync,
{
    pub fn new(on_warning: W, on_logout: L) -> Self {
        Self {
            on_warning,
            on_logout,
        }
    }
}

impl<W, L> SessionEvents for CallbackEvents<W, L>
where
    W: Fn(&SessionWarning) + Send + Sync,
    L: Fn(LogoutReason) + Send + Sync,
{
    fn on_warning(&self, warning: &SessionWarning) {
        (self.on_warning)(warning);
    }

    fn on_logout(&self, reason: LogoutReason) {
        (self.on_logout)(reason);
    }
}

/// Message form of the callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Warning(SessionWarning),
    WarningWithdrawn,
    Logout(LogoutReason),
}

/// Sink forwarding events onto a channel consumed by the view layer
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelEvents {
    /// Create a sink together with the receiving end
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!("Session event dropped: receiver is gone");
        }
    }
}

impl SessionEvents for ChannelEvents {
    fn on_warning(&self, warning: &SessionWarning) {
        self.send(SessionEvent::Warning(warning.clone()));
    }

    fn on_logout(&self, reason: LogoutReason) {
        self.send(SessionEvent::Logout(reason));
    }

    fn on_warning_withdrawn(&self) {
        self.send(SessionEvent::WarningWithdrawn);
    }
}
