use std::collections::HashSet;

use chrono::Utc;
use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::RelayError;
use super::events::{ClientEvent, MessageOut, RelayEvent, SessionId};
use super::rooms::{club_room, user_room, RoomRegistry};
use super::session::Session;
use super::validation;
use crate::db::queries::{messages, profiles};

/// The central fan-out hub. The WebSocket adapter feeds it inbound events;
/// it persists what is durable, resolves target rooms, and pushes outbound
/// events into each member session's channel.
pub struct EventRelay {
    /// All currently connected sessions, keyed by session ID.
    sessions: DashMap<SessionId, Session>,
    /// Room membership, keyed by `user:<id>` / `club:<id>`.
    rooms: RoomRegistry,
    /// Optional database pool. When present, chat messages are persisted
    /// before fan-out; when absent (tests), delivery is in-memory only.
    db: Option<SqlitePool>,
}

impl EventRelay {
    pub fn new(db: Option<SqlitePool>) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: RoomRegistry::new(),
            db,
        }
    }

    /// Register a new session. Returns the session ID and the receiver the
    /// transport adapter should drain for outbound events.
    pub fn connect(&self) -> (SessionId, mpsc::UnboundedReceiver<RelayEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.insert(session_id, Session::new(session_id, tx));
        info!(%session_id, "session connected");
        (session_id, rx)
    }

    /// Tear down a session: remove it from every room, then drop the record.
    /// The only teardown path — there is no explicit logout event.
    pub fn disconnect(&self, session_id: SessionId) {
        self.rooms.remove_session(session_id);
        if let Some((_, session)) = self.sessions.remove(&session_id) {
            info!(%session_id, user_id = ?session.user_id, "session disconnected");
        }
    }

    /// Dispatch one inbound event. Errors are local to this event and are
    /// reported back to the originating session by the caller.
    pub async fn handle_event(
        &self,
        session_id: SessionId,
        event: ClientEvent,
    ) -> Result<(), RelayError> {
        match event {
            ClientEvent::JoinUserRoom { user_id } => self.identify(session_id, &user_id),
            ClientEvent::LeaveUserRoom { user_id } => {
                validation::validate_id("userId", &user_id)?;
                self.rooms.leave(session_id, &user_room(&user_id));
                Ok(())
            }
            ClientEvent::JoinClub { club_id } => {
                validation::validate_id("clubId", &club_id)?;
                self.rooms.join(session_id, &club_room(&club_id));
                Ok(())
            }
            ClientEvent::LeaveClub { club_id } => {
                validation::validate_id("clubId", &club_id)?;
                self.rooms.leave(session_id, &club_room(&club_id));
                Ok(())
            }
            ClientEvent::ClubMessage {
                club_id,
                user_id,
                message,
            } => {
                self.send_club_message(session_id, &club_id, &user_id, &message)
                    .await
            }
            ClientEvent::DirectMessage {
                sender_id,
                receiver_id,
                message,
            } => {
                self.send_direct_message(session_id, &sender_id, &receiver_id, &message)
                    .await
            }
            ClientEvent::ActivityUpdate {
                activity_id,
                update,
            } => {
                validation::validate_id("activityId", &activity_id)?;
                self.broadcast_all(
                    &RelayEvent::ActivityUpdated {
                        activity_id,
                        update,
                    },
                    Some(session_id),
                );
                Ok(())
            }
            ClientEvent::UserFollowed {
                followed_user_id,
                follower_id,
                follower_data,
                timestamp,
            } => {
                validation::validate_id("followedUserId", &followed_user_id)?;
                validation::validate_id("followerId", &follower_id)?;
                self.fan_out(
                    &[user_room(&followed_user_id)],
                    &RelayEvent::NewFollower {
                        followed_user_id: followed_user_id.clone(),
                        follower_id: follower_id.clone(),
                        follower_data,
                        timestamp,
                    },
                    None,
                );
                // Let the follower's other devices refresh their following list.
                self.fan_out(
                    &[user_room(&follower_id)],
                    &RelayEvent::FollowingUpdated {
                        user_id: followed_user_id,
                        followed: true,
                        timestamp,
                    },
                    None,
                );
                Ok(())
            }
            ClientEvent::UserUnfollowed {
                unfollowed_user_id,
                unfollower_id,
                timestamp,
            } => {
                validation::validate_id("unfollowedUserId", &unfollowed_user_id)?;
                validation::validate_id("unfollowerId", &unfollower_id)?;
                self.fan_out(
                    &[user_room(&unfollowed_user_id)],
                    &RelayEvent::FollowerRemoved {
                        unfollowed_user_id: unfollowed_user_id.clone(),
                        unfollower_id: unfollower_id.clone(),
                        timestamp,
                    },
                    None,
                );
                self.fan_out(
                    &[user_room(&unfollower_id)],
                    &RelayEvent::FollowingUpdated {
                        user_id: unfollowed_user_id,
                        followed: false,
                        timestamp,
                    },
                    None,
                );
                Ok(())
            }
        }
    }

    /// Bind a user identity to a session and join its personal room.
    /// Idempotent for the same id; a different id on an already-identified
    /// session is rejected rather than re-bound.
    pub fn identify(&self, session_id: SessionId, user_id: &str) -> Result<(), RelayError> {
        validation::validate_id("userId", user_id)?;

        {
            let mut session = self
                .sessions
                .get_mut(&session_id)
                .ok_or(RelayError::UnknownSession)?;

            match &session.user_id {
                Some(existing) if existing == user_id => {}
                Some(existing) => {
                    warn!(%session_id, %existing, requested = %user_id,
                        "rejected identify with a different user id");
                    return Err(RelayError::Validation(
                        "Session is already identified as a different user".into(),
                    ));
                }
                None => session.user_id = Some(user_id.to_string()),
            }
        }

        self.rooms.join(session_id, &user_room(user_id));
        info!(%session_id, %user_id, "session identified");
        Ok(())
    }

    /// Persist and fan out a club message. The write and the fan-out are one
    /// unit: a failed insert means zero recipients.
    pub async fn send_club_message(
        &self,
        session_id: SessionId,
        club_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<(), RelayError> {
        validation::validate_id("clubId", club_id)?;
        self.check_sender(session_id, sender_id)?;
        validation::validate_message(content)?;

        let out = self
            .persist_message(sender_id, Some(club_id), None, content)
            .await?;

        self.fan_out(&[club_room(club_id)], &RelayEvent::NewClubMessage(out), None);
        Ok(())
    }

    /// Persist and fan out a direct message to both participants' personal
    /// rooms, so the sender's other open sessions see their own message.
    pub async fn send_direct_message(
        &self,
        session_id: SessionId,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<(), RelayError> {
        validation::validate_id("receiverId", receiver_id)?;
        self.check_sender(session_id, sender_id)?;
        validation::validate_message(content)?;

        let out = self
            .persist_message(sender_id, None, Some(receiver_id), content)
            .await?;

        self.fan_out(
            &[user_room(sender_id), user_room(receiver_id)],
            &RelayEvent::NewDirectMessage(out),
            None,
        );
        Ok(())
    }

    /// Send an event directly to one session (used for error reporting).
    pub fn send_to_session(&self, session_id: SessionId, event: RelayEvent) {
        if let Some(session) = self.sessions.get(&session_id) {
            if !session.send(event) {
                warn!(%session_id, "failed to send event to session (channel closed)");
            }
        }
    }

    /// Current member sessions of a room.
    pub fn members_of(&self, room_key: &str) -> Vec<SessionId> {
        self.rooms.members_of(room_key)
    }

    /// The user id a session identified as, if any.
    pub fn session_user(&self, session_id: SessionId) -> Option<String> {
        self.sessions
            .get(&session_id)
            .and_then(|s| s.user_id.clone())
    }

    /// The sender field is required, and an identified session may only send
    /// as itself. Unidentified sessions are taken at their word — identity is
    /// client-asserted at this layer.
    fn check_sender(&self, session_id: SessionId, sender_id: &str) -> Result<(), RelayError> {
        validation::validate_id("senderId", sender_id)?;

        let session = self
            .sessions
            .get(&session_id)
            .ok_or(RelayError::UnknownSession)?;

        if let Some(bound) = &session.user_id {
            if bound != sender_id {
                return Err(RelayError::Validation(
                    "Sender id does not match this session's user".into(),
                ));
            }
        }
        Ok(())
    }

    /// Insert the message row and return it with the sender's display fields
    /// attached. With no database configured the row is synthesized in memory
    /// (test mode) so fan-out behavior stays observable.
    async fn persist_message(
        &self,
        sender_id: &str,
        club_id: Option<&str>,
        receiver_id: Option<&str>,
        content: &str,
    ) -> Result<MessageOut, RelayError> {
        let id = Uuid::new_v4().to_string();

        let (created_at, profile) = match &self.db {
            Some(pool) => {
                let created_at =
                    messages::insert_message(pool, &id, sender_id, club_id, receiver_id, content)
                        .await?;
                let profile = profiles::get_profile(pool, sender_id).await?;
                (created_at, profile)
            }
            None => (Utc::now(), None),
        };

        Ok(MessageOut {
            id,
            sender_id: sender_id.to_string(),
            club_id: club_id.map(str::to_string),
            receiver_id: receiver_id.map(str::to_string),
            message: content.to_string(),
            created_at,
            sender_username: profile.as_ref().map(|p| p.username.clone()),
            sender_avatar_url: profile.and_then(|p| p.avatar_url),
        })
    }

    /// Deliver an event to every session in the given rooms, deduplicated
    /// across rooms, optionally excluding one session. Per-recipient send
    /// failures are logged and dropped (at-most-once, best-effort).
    fn fan_out(&self, room_keys: &[String], event: &RelayEvent, exclude: Option<SessionId>) {
        let mut targets: HashSet<SessionId> = HashSet::new();
        for key in room_keys {
            targets.extend(self.rooms.members_of(key));
        }

        for member_id in targets {
            if Some(member_id) == exclude {
                continue;
            }
            if let Some(session) = self.sessions.get(&member_id) {
                if !session.send(event.clone()) {
                    warn!(%member_id, "failed to send event to session (channel closed)");
                }
            }
        }
    }

    /// Deliver an event to every connected session except the originator.
    fn broadcast_all(&self, event: &RelayEvent, exclude: Option<SessionId>) {
        for session in self.sessions.iter() {
            if Some(session.id) == exclude {
                continue;
            }
            if !session.send(event.clone()) {
                warn!(session_id = %session.id, "failed to send event to session (channel closed)");
            }
        }
    }
}
