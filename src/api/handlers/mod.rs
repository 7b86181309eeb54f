pub mod auth;
pub mod health;
pub mod masquerade;
pub mod me;
pub mod sudo;
pub mod types;
