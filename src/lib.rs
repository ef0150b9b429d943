pub mod config;
pub mod db;
pub mod error;
pub mod google_oauth;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;
pub mod types;

pub use error::AuthError;
pub use google_oauth::GoogleOauthEndpoints;
pub use service::TokenLifecycle;

/// The lifecycle wired to the production collaborators.
pub type GoogleTokenLifecycle =
    TokenLifecycle<db::CredentialsStorage, db::CredentialsStorage, GoogleOauthEndpoints>;
