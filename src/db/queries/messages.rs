use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::MessageRow;

/// Insert a new message row. Exactly one of `club_id` / `receiver_id` must be
/// set. Returns the timestamp the persistence layer assigned.
pub async fn insert_message(
    pool: &SqlitePool,
    id: &str,
    sender_id: &str,
    club_id: Option<&str>,
    receiver_id: Option<&str>,
    content: &str,
) -> Result<DateTime<Utc>, sqlx::Error> {
    let created_at: String = sqlx::query_scalar(
        "INSERT INTO messages (id, sender_id, club_id, receiver_id, content) \
         VALUES (?, ?, ?, ?, ?) \
         RETURNING created_at",
    )
    .bind(id)
    .bind(sender_id)
    .bind(club_id)
    .bind(receiver_id)
    .bind(content)
    .fetch_one(pool)
    .await?;

    Ok(created_at
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|_| Utc::now()))
}

/// Fetch club message history with cursor-based pagination.
/// Returns messages before `before_time`, ordered newest first.
pub async fn fetch_club_history(
    pool: &SqlitePool,
    club_id: &str,
    before_time: Option<&str>,
    limit: i64,
) -> Result<Vec<MessageRow>, sqlx::Error> {
    let rows = match before_time {
        Some(before) => {
            sqlx::query_as::<_, MessageRow>(
                "SELECT m.id, m.sender_id, m.club_id, m.receiver_id, m.content, m.created_at, \
                        p.username AS sender_username, p.avatar_url AS sender_avatar_url \
                 FROM messages m LEFT JOIN profiles p ON p.user_id = m.sender_id \
                 WHERE m.club_id = ? AND m.created_at < ? \
                 ORDER BY m.created_at DESC \
                 LIMIT ?",
            )
            .bind(club_id)
            .bind(before)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, MessageRow>(
                "SELECT m.id, m.sender_id, m.club_id, m.receiver_id, m.content, m.created_at, \
                        p.username AS sender_username, p.avatar_url AS sender_avatar_url \
                 FROM messages m LEFT JOIN profiles p ON p.user_id = m.sender_id \
                 WHERE m.club_id = ? \
                 ORDER BY m.created_at DESC \
                 LIMIT ?",
            )
            .bind(club_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Fetch direct message history between two users, in either direction,
/// ordered newest first.
pub async fn fetch_direct_history(
    pool: &SqlitePool,
    user_a: &str,
    user_b: &str,
    before_time: Option<&str>,
    limit: i64,
) -> Result<Vec<MessageRow>, sqlx::Error> {
    let rows = match before_time {
        Some(before) => {
            sqlx::query_as::<_, MessageRow>(
                "SELECT m.id, m.sender_id, m.club_id, m.receiver_id, m.content, m.created_at, \
                        p.username AS sender_username, p.avatar_url AS sender_avatar_url \
                 FROM messages m LEFT JOIN profiles p ON p.user_id = m.sender_id \
                 WHERE ((m.sender_id = ? AND m.receiver_id = ?) \
                     OR (m.sender_id = ? AND m.receiver_id = ?)) \
                   AND m.created_at < ? \
                 ORDER BY m.created_at DESC \
                 LIMIT ?",
            )
            .bind(user_a)
            .bind(user_b)
            .bind(user_b)
            .bind(user_a)
            .bind(before)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, MessageRow>(
                "SELECT m.id, m.sender_id, m.club_id, m.receiver_id, m.content, m.created_at, \
                        p.username AS sender_username, p.avatar_url AS sender_avatar_url \
                 FROM messages m LEFT JOIN profiles p ON p.user_id = m.sender_id \
                 WHERE (m.sender_id = ? AND m.receiver_id = ?) \
                    OR (m.sender_id = ? AND m.receiver_id = ?) \
                 ORDER BY m.created_at DESC \
                 LIMIT ?",
            )
            .bind(user_a)
            .bind(user_b)
            .bind(user_b)
            .bind(user_a)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}
