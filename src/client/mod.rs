pub mod manager;
pub mod policy;
