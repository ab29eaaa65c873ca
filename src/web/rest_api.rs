use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::db::queries::messages;
use crate::relay::events::MessageOut;

use super::app_state::AppState;

/// GET /api/health — liveness probe used by clients before opening the
/// real-time transport. Status only, no body contract.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub before: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<MessageOut>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// GET /api/clubs/{club_id}/messages — club chat history, newest first.
pub async fn get_club_history(
    State(state): State<Arc<AppState>>,
    Path(club_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let Some(pool) = &state.db else {
        return Json(HistoryResponse {
            messages: vec![],
            has_more: false,
        })
        .into_response();
    };

    let limit = params.limit.unwrap_or(50).min(200);

    // Fetch one extra to determine whether there are more.
    match messages::fetch_club_history(pool, &club_id, params.before.as_deref(), limit + 1).await {
        Ok(rows) => {
            let has_more = rows.len() as i64 > limit;
            let messages = rows
                .into_iter()
                .take(limit as usize)
                .map(|row| row.into_out())
                .collect();
            Json(HistoryResponse { messages, has_more }).into_response()
        }
        Err(e) => {
            error!(error = %e, %club_id, "failed to fetch club history");
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// GET /api/messages/direct/{user_a}/{user_b} — DM history between two
/// users, in either direction, newest first.
pub async fn get_direct_history(
    State(state): State<Arc<AppState>>,
    Path((user_a, user_b)): Path<(String, String)>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let Some(pool) = &state.db else {
        return Json(HistoryResponse {
            messages: vec![],
            has_more: false,
        })
        .into_response();
    };

    let limit = params.limit.unwrap_or(50).min(200);

    match messages::fetch_direct_history(
        pool,
        &user_a,
        &user_b,
        params.before.as_deref(),
        limit + 1,
    )
    .await
    {
        Ok(rows) => {
            let has_more = rows.len() as i64 > limit;
            let messages = rows
                .into_iter()
                .take(limit as usize)
                .map(|row| row.into_out())
                .collect();
            Json(HistoryResponse { messages, has_more }).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to fetch direct history");
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}
