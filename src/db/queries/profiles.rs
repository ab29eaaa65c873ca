use sqlx::SqlitePool;

use crate::db::models::ProfileRow;

/// Look up a user's display fields. Missing profiles are not an error — the
/// relay delivers the message with ids only.
pub async fn get_profile(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Option<ProfileRow>, sqlx::Error> {
    sqlx::query_as::<_, ProfileRow>(
        "SELECT user_id, username, avatar_url FROM profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Insert or refresh a profile mirror row. Called by the sync path that
/// follows the external profile service, and by tests.
pub async fn upsert_profile(
    pool: &SqlitePool,
    user_id: &str,
    username: &str,
    avatar_url: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO profiles (user_id, username, avatar_url) VALUES (?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET username = excluded.username, \
         avatar_url = excluded.avatar_url",
    )
    .bind(user_id)
    .bind(username)
    .bind(avatar_url)
    .execute(pool)
    .await?;
    Ok(())
}
