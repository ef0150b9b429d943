//! Checks run by `complete_authorization` before anything is persisted.
//!
//! Each step returns a typed pass/fail so the order is explicit:
//! state integrity, state freshness, code exchange, userinfo, identity
//! uniqueness, admin role.

use crate::db::{AccountDirectory, CredentialStore, SubjectId};
use crate::error::AuthError;
use crate::google_oauth::{AuthorizationProvider, GoogleIdentity, StateSigner, TokenSet};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Steps 1 and 2.
pub fn verify_state(
    signer: &StateSigner,
    state: &str,
    now: DateTime<Utc>,
) -> Result<SubjectId, AuthError> {
    signer.verify_at(state, now).inspect_err(|e| {
        warn!(error = %e, "OAuth state verification failed");
    })
}

/// Step 3.
pub async fn exchange_code<P: AuthorizationProvider>(
    provider: &P,
    subject_id: SubjectId,
    code: &str,
) -> Result<TokenSet, AuthError> {
    let tokens = provider.exchange_code(code).await.map_err(|e| {
        warn!(subject_id, error = %e, "authorization code exchange failed");
        AuthError::ExchangeFailed(e.to_string())
    })?;
    if tokens.access_token.is_empty() {
        return Err(AuthError::ExchangeFailed(
            "no access token received from Google".to_string(),
        ));
    }
    Ok(tokens)
}

/// Step 4.
pub async fn resolve_identity<P: AuthorizationProvider>(
    provider: &P,
    subject_id: SubjectId,
    access_token: &str,
) -> Result<GoogleIdentity, AuthError> {
    let identity = provider.fetch_userinfo(access_token).await.map_err(|e| {
        warn!(subject_id, error = %e, "userinfo lookup failed");
        AuthError::UserInfoFailed(e.to_string())
    })?;
    if identity.account_id.is_empty() || identity.email.is_empty() {
        return Err(AuthError::UserInfoFailed(
            "userinfo returned an empty id or email".to_string(),
        ));
    }
    Ok(identity)
}

/// Step 5: the Google account must not back a different subject.
pub async fn ensure_identity_unlinked<S: CredentialStore>(
    store: &S,
    subject_id: SubjectId,
    identity: &GoogleIdentity,
) -> Result<(), AuthError> {
    match store.find_by_google_account(&identity.account_id).await? {
        Some(existing) if existing.subject_id != subject_id => {
            warn!(
                subject_id,
                linked_subject_id = existing.subject_id,
                google_email = %identity.email,
                "refusing to link Google account already connected to another user"
            );
            Err(AuthError::IdentityAlreadyLinked)
        }
        _ => Ok(()),
    }
}

/// Step 6.
pub async fn ensure_admin<A: AccountDirectory>(
    accounts: &A,
    subject_id: SubjectId,
) -> Result<(), AuthError> {
    if accounts.is_active_admin(subject_id).await? {
        Ok(())
    } else {
        warn!(subject_id, "non-admin attempted to link Google Drive");
        Err(AuthError::NotAuthorized)
    }
}
