use std::sync::Arc;

use sqlx::SqlitePool;

use crate::relay::event_relay::EventRelay;

/// Shared application state available to all HTTP/WebSocket handlers.
pub struct AppState {
    pub relay: Arc<EventRelay>,
    /// Pool for the REST history endpoints. `None` runs the relay without
    /// durable messages (in-memory only), which some tests rely on.
    pub db: Option<SqlitePool>,
}
