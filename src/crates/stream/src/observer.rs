//! Session observation hooks
//!
//! The rendering layer watches `on_mutation`; chat-history persistence takes
//! the single terminal callback of each session.

use crate::errors::StreamError;
use parley_core_types::MessageSnapshot;
use tokio::sync::mpsc;

pub trait SessionObserver: Send + Sync {
    /// Fired after every accumulator mutation.
    fn on_mutation(&self, _snapshot: &MessageSnapshot) {}

    fn on_finalized(&self, _message: &MessageSnapshot) {}

    /// User-initiated stop. Not a failure.
    fn on_aborted(&self) {}

    fn on_failed(&self, _error: &StreamError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Mutated(MessageSnapshot),
    Finalized(MessageSnapshot),
    Aborted,
    Failed(String),
}

impl SessionUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Mutated(_))
    }
}

/// Forwards every callback into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, update: SessionUpdate) {
        // Receiver gone means nobody is rendering anymore.
        let _ = self.tx.send(update);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_mutation(&self, snapshot: &MessageSnapshot) {
        self.send(SessionUpdate::Mutated(snapshot.clone()));
    }

    fn on_finalized(&self, message: &MessageSnapshot) {
        self.send(SessionUpdate::Finalized(message.clone()));
    }

    fn on_aborted(&self) {
        self.send(SessionUpdate::Aborted);
    }

    fn on_failed(&self, error: &StreamError) {
        self.send(SessionUpdate::Failed(error.to_string()));
    }
}
