//! Send-event collaborator boundary.
//!
//! Listeners observe each send: once before any network I/O, where they
//! may cancel the attempt, and once after, carrying the outcome. The
//! transport owns no listener logic of its own.

/// Outcome carried by the post-send notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendResult {
    /// The send has not completed yet.
    #[default]
    Pending,
    /// The service accepted the message.
    Success,
    /// The send failed or was not accepted.
    Failed,
}

/// Notification value passed to listeners around a send.
#[derive(Debug, Default)]
pub struct SendEvent {
    result: SendResult,
    cancelled: bool,
}

impl SendEvent {
    /// Creates a pending, uncancelled event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The outcome of the send, [`SendResult::Pending`] until it
    /// completes.
    #[must_use]
    pub const fn result(&self) -> SendResult {
        self.result
    }

    pub(crate) const fn set_result(&mut self, result: SendResult) {
        self.result = result;
    }

    /// Cancels the send. Only effective from
    /// [`EventListener::before_send`]; a cancelled send performs no
    /// network I/O and reports zero accepted recipients.
    pub const fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether a listener cancelled this send.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// A registered observer of transport sends.
pub trait EventListener {
    /// Called before any network I/O. May cancel the send.
    fn before_send(&self, event: &mut SendEvent) {
        let _ = event;
    }

    /// Called after the send concludes, on success and failure alike.
    /// Not called when the send was cancelled.
    fn after_send(&self, event: &SendEvent) {
        let _ = event;
    }
}
