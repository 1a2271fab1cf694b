//! Session notifications for the presentation layer

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Something the user-facing layer should show or do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Toast-style message.
    Notice { level: NoticeLevel, message: String },
    /// Move to another entry point (e.g. the login screen).
    Navigate(String),
}

/// Receives terminal authentication failures from the refresh coordinator.
pub trait SessionObserver: Send + Sync {
    /// The server rejected the refresh token; stored credentials are already
    /// gone.
    fn session_expired(&self);
}

/// Observer for clients used without a session.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn session_expired(&self) {
        tracing::warn!("Session expired with no session attached");
    }
}

/// Sending half of the session event channel. Sends after the receiver is
/// gone are dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Session event dropped, no listener");
        }
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.send(SessionEvent::Notice {
            level,
            message: message.into(),
        });
    }

    pub fn navigate(&self, route: impl Into<String>) {
        self.send(SessionEvent::Navigate(route.into()));
    }
}
