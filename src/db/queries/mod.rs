pub mod messages;
pub mod profiles;
