use crate::db::{AccountDirectory, CredentialStatus, CredentialStore, SubjectId};
use crate::error::AuthError;
use crate::google_oauth::AuthorizationProvider;
use crate::middleware::RequireApiKey;
use crate::router::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
};
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct AuthEntryQuery {
    #[serde(rename = "userId")]
    pub user_id: SubjectId,
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /drive/auth?userId=N -> redirects to Google's consent page.
pub async fn google_oauth_entry<S, A, P>(
    _auth: RequireApiKey,
    State(state): State<AppState<S, A, P>>,
    Query(query): Query<AuthEntryQuery>,
) -> Result<Redirect, AuthError>
where
    S: CredentialStore,
    A: AccountDirectory,
    P: AuthorizationProvider,
{
    let url = state.lifecycle.begin_authorization(query.user_id)?;
    Ok(Redirect::temporary(url.as_str()))
}

/// GET /drive/auth/callback -> exchanges the code and sends the admin back to the drive page.
pub async fn google_oauth_callback<S, A, P>(
    State(state): State<AppState<S, A, P>>,
    Query(query): Query<AuthCallbackQuery>,
) -> Redirect
where
    S: CredentialStore,
    A: AccountDirectory,
    P: AuthorizationProvider,
{
    if let Some(reason) = query.error.as_deref() {
        info!(reason, "Google consent denied");
        return state.drive_redirect("error", "OAuth authorization was denied");
    }
    let Some(code) = query.code.as_deref() else {
        return state.drive_redirect("error", "No authorization code received");
    };
    let Some(oauth_state) = query.state.as_deref() else {
        return state.drive_redirect("error", "Missing state parameter");
    };

    match state
        .lifecycle
        .complete_authorization(code, oauth_state)
        .await
    {
        Ok(_) => state.drive_redirect("success", "Google Drive connected successfully"),
        Err(e) => {
            if e.is_fatal() {
                error!(error = %e, "OAuth callback failed");
            }
            state.drive_redirect("error", e.reason())
        }
    }
}

/// GET /drive/auth/{subject_id}/status
pub async fn credential_status<S, A, P>(
    _auth: RequireApiKey,
    State(state): State<AppState<S, A, P>>,
    Path(subject_id): Path<SubjectId>,
) -> Result<Json<CredentialStatus>, AuthError>
where
    S: CredentialStore,
    A: AccountDirectory,
    P: AuthorizationProvider,
{
    Ok(Json(state.lifecycle.credential_status(subject_id).await?))
}

/// DELETE /drive/auth/{subject_id}
pub async fn revoke_access<S, A, P>(
    _auth: RequireApiKey,
    State(state): State<AppState<S, A, P>>,
    Path(subject_id): Path<SubjectId>,
) -> Result<StatusCode, AuthError>
where
    S: CredentialStore,
    A: AccountDirectory,
    P: AuthorizationProvider,
{
    state.lifecycle.revoke_access(subject_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
