pub mod auth;

pub use auth::{AccessKeys, RequireApiKey, RequireCronSecret};
