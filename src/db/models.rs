use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::relay::events::MessageOut;

/// A stored message from the database, with the sender's display fields
/// joined on where the query provides them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub club_id: Option<String>,
    pub receiver_id: Option<String>,
    pub content: String,
    pub created_at: String,
    pub sender_username: Option<String>,
    pub sender_avatar_url: Option<String>,
}

impl MessageRow {
    /// Convert into the wire shape. Timestamps are stored as RFC 3339 text;
    /// an unparseable value falls back to now rather than failing delivery.
    pub fn into_out(self) -> MessageOut {
        MessageOut {
            id: self.id,
            sender_id: self.sender_id,
            club_id: self.club_id,
            receiver_id: self.receiver_id,
            message: self.content,
            created_at: self
                .created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            sender_username: self.sender_username,
            sender_avatar_url: self.sender_avatar_url,
        }
    }
}

/// A user's display fields, mirrored from the profile service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfileRow {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}
