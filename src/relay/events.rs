use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connected session (one per connection, not per user).
pub type SessionId = Uuid;

/// Client-to-server events, tagged by `type`. Event names and payload field
/// names match the wire protocol the mobile and web clients already speak,
/// which is why the naming mixes kebab-case and snake_case.
///
/// Anything that does not parse into this enum is rejected at the boundary
/// before it reaches the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Bind a user identity to this session and join `user:<userId>`.
    #[serde(rename = "join-user-room")]
    JoinUserRoom {
        #[serde(rename = "userId")]
        user_id: String,
    },

    #[serde(rename = "leave-user-room")]
    LeaveUserRoom {
        #[serde(rename = "userId")]
        user_id: String,
    },

    #[serde(rename = "join_club")]
    JoinClub {
        #[serde(rename = "clubId")]
        club_id: String,
    },

    #[serde(rename = "leave_club")]
    LeaveClub {
        #[serde(rename = "clubId")]
        club_id: String,
    },

    /// A chat message to a club channel. Persisted, then fanned out.
    #[serde(rename = "club_message")]
    ClubMessage {
        #[serde(rename = "clubId")]
        club_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        message: String,
    },

    /// A direct message. Persisted, then fanned out to both user rooms.
    #[serde(rename = "direct_message")]
    DirectMessage {
        #[serde(rename = "senderId")]
        sender_id: String,
        #[serde(rename = "receiverId")]
        receiver_id: String,
        message: String,
    },

    /// An ephemeral activity update, broadcast to everyone but the sender.
    #[serde(rename = "activity_update")]
    ActivityUpdate {
        #[serde(rename = "activityId")]
        activity_id: String,
        update: serde_json::Value,
    },

    /// Forwarded follow notification. The follow row itself is owned by the
    /// profile service; the relay only routes the event.
    #[serde(rename = "user-followed")]
    UserFollowed {
        #[serde(rename = "followedUserId")]
        followed_user_id: String,
        #[serde(rename = "followerId")]
        follower_id: String,
        #[serde(rename = "followerData")]
        follower_data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "user-unfollowed")]
    UserUnfollowed {
        #[serde(rename = "unfollowedUserId")]
        unfollowed_user_id: String,
        #[serde(rename = "unfollowerId")]
        unfollower_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// Server-to-client events, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayEvent {
    #[serde(rename = "new_club_message")]
    NewClubMessage(MessageOut),

    #[serde(rename = "new_direct_message")]
    NewDirectMessage(MessageOut),

    #[serde(rename = "activity_updated")]
    ActivityUpdated {
        #[serde(rename = "activityId")]
        activity_id: String,
        update: serde_json::Value,
    },

    #[serde(rename = "new-follower")]
    NewFollower {
        #[serde(rename = "followedUserId")]
        followed_user_id: String,
        #[serde(rename = "followerId")]
        follower_id: String,
        #[serde(rename = "followerData")]
        follower_data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "follower-removed")]
    FollowerRemoved {
        #[serde(rename = "unfollowedUserId")]
        unfollowed_user_id: String,
        #[serde(rename = "unfollowerId")]
        unfollower_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Sent to the actor's own room on follow/unfollow so their other open
    /// sessions refresh their following list.
    #[serde(rename = "following-updated")]
    FollowingUpdated {
        #[serde(rename = "userId")]
        user_id: String,
        followed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Error local to the originating session. Never fanned out.
    #[serde(rename = "error")]
    Error { message: String },
}

/// A persisted message as delivered to clients, with the sender's display
/// fields denormalized onto it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageOut {
    pub id: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "clubId", skip_serializing_if = "Option::is_none")]
    pub club_id: Option<String>,
    #[serde(rename = "receiverId", skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    pub message: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "senderUsername", skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    #[serde(rename = "senderAvatarUrl", skip_serializing_if = "Option::is_none")]
    pub sender_avatar_url: Option<String>,
}
