use crate::db::{AccountDirectory, CredentialStore};
use crate::error::AuthError;
use crate::google_oauth::AuthorizationProvider;
use crate::handlers::{cron, google_oauth};
use crate::middleware::AccessKeys;
use crate::service::TokenLifecycle;
use axum::{
    Router,
    extract::FromRef,
    response::Redirect,
    routing::{delete, get},
};
use std::sync::Arc;
use url::Url;

pub struct AppState<S, A, P> {
    pub lifecycle: Arc<TokenLifecycle<S, A, P>>,
    pub keys: AccessKeys,
    drive_url: Arc<Url>,
}

impl<S, A, P> Clone for AppState<S, A, P> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            keys: self.keys.clone(),
            drive_url: self.drive_url.clone(),
        }
    }
}

impl<S, A, P> AppState<S, A, P> {
    pub fn new(
        lifecycle: Arc<TokenLifecycle<S, A, P>>,
        keys: AccessKeys,
        frontend_url: &Url,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            lifecycle,
            keys,
            drive_url: Arc::new(frontend_url.join("/drive")?),
        })
    }

    /// Redirect to the frontend drive page with `?{key}={message}`.
    pub fn drive_redirect(&self, key: &str, message: &str) -> Redirect {
        let mut url = (*self.drive_url).clone();
        url.query_pairs_mut().append_pair(key, message);
        Redirect::to(url.as_str())
    }
}

impl<S, A, P> FromRef<AppState<S, A, P>> for AccessKeys {
    fn from_ref(state: &AppState<S, A, P>) -> Self {
        state.keys.clone()
    }
}

pub fn app_router<S, A, P>(state: AppState<S, A, P>) -> Router
where
    S: CredentialStore,
    A: AccountDirectory,
    P: AuthorizationProvider,
{
    Router::new()
        .route("/drive/auth", get(google_oauth::google_oauth_entry::<S, A, P>))
        .route(
            "/drive/auth/callback",
            get(google_oauth::google_oauth_callback::<S, A, P>),
        )
        .route(
            "/drive/auth/{subject_id}/status",
            get(google_oauth::credential_status::<S, A, P>),
        )
        .route(
            "/drive/auth/{subject_id}",
            delete(google_oauth::revoke_access::<S, A, P>),
        )
        .route(
            "/cron/token-refresh",
            get(cron::token_refresh::<S, A, P>).post(cron::token_refresh::<S, A, P>),
        )
        .with_state(state)
}
