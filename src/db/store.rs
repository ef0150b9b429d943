use crate::db::models::{AdminCredential, LinkRecord, SubjectId, TokenUpdate};
use crate::error::AuthError;
use std::future::Future;

/// Persistent home of [`AdminCredential`] rows.
pub trait CredentialStore: Send + Sync + 'static {
    fn find_by_subject(
        &self,
        subject_id: SubjectId,
    ) -> impl Future<Output = Result<Option<AdminCredential>, AuthError>> + Send;

    fn find_by_google_account(
        &self,
        google_account_id: &str,
    ) -> impl Future<Output = Result<Option<AdminCredential>, AuthError>> + Send;

    /// Insert or replace the link for `record.subject_id` and mark it authorized.
    /// Fails with [`AuthError::IdentityAlreadyLinked`] if another subject holds the account.
    fn upsert_link(
        &self,
        record: LinkRecord,
    ) -> impl Future<Output = Result<AdminCredential, AuthError>> + Send;

    /// Compare-and-swap on the refresh token read by the caller.
    /// Returns `false` when the row changed underneath.
    fn update_tokens(
        &self,
        subject_id: SubjectId,
        expected_refresh_token: &str,
        update: TokenUpdate,
    ) -> impl Future<Output = Result<bool, AuthError>> + Send;

    /// Mark the row unauthorized only while it still holds `rejected_refresh_token`.
    /// Returns `false` when another writer already replaced the token.
    fn mark_unauthorized(
        &self,
        subject_id: SubjectId,
        rejected_refresh_token: &str,
    ) -> impl Future<Output = Result<bool, AuthError>> + Send;

    /// Drop all token material and mark the row unauthorized.
    fn clear_tokens(
        &self,
        subject_id: SubjectId,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Authorized rows that still hold a refresh token.
    fn list_refreshable(
        &self,
    ) -> impl Future<Output = Result<Vec<AdminCredential>, AuthError>> + Send;
}

/// The account system's answer to "may this subject act as an admin".
pub trait AccountDirectory: Send + Sync + 'static {
    fn is_active_admin(
        &self,
        subject_id: SubjectId,
    ) -> impl Future<Output = Result<bool, AuthError>> + Send;
}
