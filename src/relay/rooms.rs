use std::collections::HashSet;

use dashmap::DashMap;

use super::events::SessionId;

/// Room key for a user's personal notification channel.
pub fn user_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Room key for a club's group chat channel.
pub fn club_room(club_id: &str) -> String {
    format!("club:{club_id}")
}

/// Tracks which sessions are in which room. A room is nothing but its member
/// set: created lazily on first join, discarded when the last member leaves.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, HashSet<SessionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a session to a room. Idempotent.
    pub fn join(&self, session_id: SessionId, room_key: &str) {
        self.rooms
            .entry(room_key.to_string())
            .or_default()
            .insert(session_id);
    }

    /// Remove a session from a room. No-op if the session was not a member.
    pub fn leave(&self, session_id: SessionId, room_key: &str) {
        if let Some(mut members) = self.rooms.get_mut(room_key) {
            members.remove(&session_id);
        }
        // Memory reclamation only; an empty room and a missing room behave
        // identically to callers.
        self.rooms.remove_if(room_key, |_, members| members.is_empty());
    }

    /// Snapshot of the current members of a room. A session that joins after
    /// this snapshot is taken is not guaranteed to receive the event being
    /// fanned out against it.
    pub fn members_of(&self, room_key: &str) -> Vec<SessionId> {
        self.rooms
            .get(room_key)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove a session from every room it belongs to. Called on disconnect.
    pub fn remove_session(&self, session_id: SessionId) {
        let mut emptied = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            if entry.value_mut().remove(&session_id) && entry.value().is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for key in emptied {
            self.rooms.remove_if(&key, |_, members| members.is_empty());
        }
    }

    pub fn contains(&self, session_id: SessionId, room_key: &str) -> bool {
        self.rooms
            .get(room_key)
            .is_some_and(|members| members.contains(&session_id))
    }
}
