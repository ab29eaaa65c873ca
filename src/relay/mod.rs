pub mod error;
pub mod event_relay;
pub mod events;
pub mod rooms;
pub mod session;
pub mod validation;
