use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::events::{RelayEvent, SessionId};

/// A live client connection. Identity is bound lazily — a session exists from
/// the moment the transport connects, but `user_id` stays empty until the
/// client sends a join-user-room event.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Set once by identify; a second identify with a different id is rejected.
    pub user_id: Option<String>,
    /// Send outbound events to this session's write loop.
    pub outbound: mpsc::UnboundedSender<RelayEvent>,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, outbound: mpsc::UnboundedSender<RelayEvent>) -> Self {
        Self {
            id,
            user_id: None,
            outbound,
            connected_at: Utc::now(),
        }
    }

    /// Send an event to this session. Returns false if the receiver is gone
    /// (transport already closed); the relay logs and drops in that case.
    pub fn send(&self, event: RelayEvent) -> bool {
        self.outbound.send(event).is_ok()
    }
}
