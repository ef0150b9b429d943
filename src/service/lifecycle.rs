use crate::config::RefreshConfig;
use crate::db::{
    AccountDirectory, AdminCredential, CredentialStatus, CredentialStore, LinkRecord, SubjectId,
    TokenUpdate,
};
use crate::error::AuthError;
use crate::google_oauth::{AuthorizationProvider, ProviderError, StateSigner, TokenSet};
use crate::service::locks::SubjectLocks;
use crate::service::validation;
use crate::types::{RefreshReport, RefreshStatus, RefreshSummary};

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Tuning knobs for refresh behaviour.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub staleness_buffer: chrono::Duration,
    pub concurrency: usize,
    pub rate_limit_per_minute: NonZeroU32,
    pub credential_timeout: Duration,
    pub batch_timeout: Duration,
    /// Backoff for transient errors inside a batch refresh.
    pub retry_policy: ExponentialBuilder,
}

impl From<&RefreshConfig> for LifecycleSettings {
    fn from(cfg: &RefreshConfig) -> Self {
        Self {
            staleness_buffer: cfg.staleness_buffer(),
            concurrency: cfg.concurrency.max(1),
            rate_limit_per_minute: NonZeroU32::new(cfg.rate_limit_per_minute)
                .unwrap_or(NonZeroU32::MIN),
            credential_timeout: cfg.credential_timeout(),
            batch_timeout: cfg.batch_timeout(),
            retry_policy: default_retry_policy(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from(&RefreshConfig::default())
    }
}

/// How a refresh under the subject lock ended.
enum Refreshed {
    Rotated(String),
    /// Another caller refreshed while we waited for the lock.
    AlreadyFresh(String),
}

impl Refreshed {
    fn into_token(self) -> String {
        match self {
            Refreshed::Rotated(t) | Refreshed::AlreadyFresh(t) => t,
        }
    }
}

/// OAuth token lifecycle for admins who link a Google account for Drive access.
pub struct TokenLifecycle<S, A, P> {
    store: S,
    accounts: A,
    provider: P,
    signer: StateSigner,
    locks: SubjectLocks,
    limiter: DefaultDirectRateLimiter,
    settings: LifecycleSettings,
}

impl<S, A, P> TokenLifecycle<S, A, P>
where
    S: CredentialStore,
    A: AccountDirectory,
    P: AuthorizationProvider,
{
    pub fn new(
        store: S,
        accounts: A,
        provider: P,
        signer: StateSigner,
        settings: LifecycleSettings,
    ) -> Self {
        let limiter = RateLimiter::direct(Quota::per_minute(settings.rate_limit_per_minute));
        Self {
            store,
            accounts,
            provider,
            signer,
            locks: SubjectLocks::new(),
            limiter,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consent URL for `subject_id`. The caller has already checked the subject is an admin.
    pub fn begin_authorization(&self, subject_id: SubjectId) -> Result<Url, AuthError> {
        let state = self.signer.issue(subject_id)?;
        info!(subject_id, "Dispatching Google authorization");
        Ok(self.provider.authorization_url(&state))
    }

    /// Finish the consent round trip. Nothing is written unless every check passes.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<AdminCredential, AuthError> {
        let subject_id = validation::verify_state(&self.signer, state, Utc::now())?;
        let tokens = validation::exchange_code(&self.provider, subject_id, code).await?;
        let identity =
            validation::resolve_identity(&self.provider, subject_id, &tokens.access_token).await?;

        let _guard = self.locks.acquire(subject_id).await;
        validation::ensure_identity_unlinked(&self.store, subject_id, &identity).await?;
        validation::ensure_admin(&self.accounts, subject_id).await?;

        if tokens.refresh_token.is_none() {
            debug!(subject_id, "Exchange returned no refresh token; keeping stored one");
        }
        let record = LinkRecord {
            subject_id,
            google_account_id: identity.account_id,
            google_email: identity.email,
            access_token_expiry: tokens.expiry_from(Utc::now()),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        };
        let cred = self.store.upsert_link(record).await.inspect_err(|e| {
            if matches!(e, AuthError::IdentityAlreadyLinked) {
                warn!(subject_id, "Google account was linked to another user concurrently");
            }
        })?;

        info!(
            subject_id,
            google_email = %cred.google_email,
            "Google Drive linked"
        );
        Ok(cred)
    }

    /// A usable access token for `subject_id`, refreshing it when stale.
    pub async fn get_valid_access_token(&self, subject_id: SubjectId) -> Result<String, AuthError> {
        let cred = self
            .store
            .find_by_subject(subject_id)
            .await?
            .ok_or(AuthError::NoCredential)?;
        if !cred.authorized {
            return Err(AuthError::ReauthorizationRequired);
        }
        if let Some(token) = cred.fresh_access_token(Utc::now(), self.settings.staleness_buffer) {
            return Ok(token.to_string());
        }
        debug!(subject_id, "Access token stale; refreshing");
        self.refresh_subject(subject_id, None)
            .await
            .map(Refreshed::into_token)
    }

    /// Refresh every authorized credential that is stale. Individual failures
    /// are reported in the summary; only store failures abort the batch.
    pub async fn refresh_all_authorized(&self) -> Result<RefreshSummary, AuthError> {
        let creds = self.store.list_refreshable().await?;
        let deadline = Instant::now() + self.settings.batch_timeout;
        info!(total = creds.len(), "Batch token refresh started");

        let summary: RefreshSummary = stream::iter(creds)
            .map(|cred| self.refresh_one(cred, deadline))
            .buffer_unordered(self.settings.concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .collect();

        info!(
            refreshed = summary.refreshed,
            skipped = summary.skipped,
            failed = summary.failed,
            total = summary.total,
            "Batch token refresh completed"
        );
        Ok(summary)
    }

    /// Revoke the grant at Google (best effort) and drop stored tokens.
    pub async fn revoke_access(&self, subject_id: SubjectId) -> Result<(), AuthError> {
        let _guard = self.locks.acquire(subject_id).await;
        let cred = self
            .store
            .find_by_subject(subject_id)
            .await?
            .ok_or(AuthError::NoCredential)?;

        if let Some(token) = cred.refresh_token.as_deref().or(cred.access_token.as_deref())
            && let Err(e) = self.provider.revoke_token(token).await
        {
            warn!(subject_id, error = %e, "Google token revocation failed; clearing anyway");
        }
        self.store.clear_tokens(subject_id).await?;
        info!(subject_id, "Google Drive access revoked");
        Ok(())
    }

    pub async fn credential_status(
        &self,
        subject_id: SubjectId,
    ) -> Result<CredentialStatus, AuthError> {
        let cred = self
            .store
            .find_by_subject(subject_id)
            .await?
            .ok_or(AuthError::NoCredential)?;
        Ok(CredentialStatus::of(
            &cred,
            Utc::now(),
            self.settings.staleness_buffer,
        ))
    }

    async fn refresh_one(
        &self,
        cred: AdminCredential,
        deadline: Instant,
    ) -> Result<RefreshReport, AuthError> {
        let subject_id = cred.subject_id;
        let report = |status| RefreshReport {
            subject_id,
            google_email: cred.google_email.clone(),
            status,
        };

        if !cred.is_stale(Utc::now(), self.settings.staleness_buffer) {
            debug!(subject_id, "Token still valid, skipping");
            return Ok(report(RefreshStatus::Skipped {
                reason: "token still valid".to_string(),
            }));
        }
        if Instant::now() >= deadline {
            warn!(subject_id, "Batch deadline reached before refresh");
            return Ok(report(RefreshStatus::Failed {
                error: "batch deadline exceeded".to_string(),
            }));
        }

        self.limiter.until_ready().await;
        let Some(_guard) = self.locks.try_acquire(subject_id) else {
            debug!(subject_id, "Refresh already in flight, skipping");
            return Ok(report(RefreshStatus::Skipped {
                reason: "refresh already in progress".to_string(),
            }));
        };
        let budget = self
            .settings
            .credential_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let attempt = self.refresh_locked(subject_id, Some(self.settings.retry_policy.clone()));

        let status = match tokio::time::timeout(budget, attempt).await {
            Ok(Ok(Refreshed::Rotated(_))) => {
                info!(subject_id, google_email = %cred.google_email, "Token refreshed");
                RefreshStatus::Refreshed
            }
            Ok(Ok(Refreshed::AlreadyFresh(_))) => RefreshStatus::Skipped {
                reason: "refreshed concurrently".to_string(),
            },
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) => {
                warn!(subject_id, error = %e, "Token refresh failed");
                RefreshStatus::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                warn!(subject_id, timeout = ?budget, "Token refresh timed out");
                RefreshStatus::Failed {
                    error: "refresh timed out".to_string(),
                }
            }
        };
        Ok(report(status))
    }

    async fn refresh_subject(
        &self,
        subject_id: SubjectId,
        retry: Option<ExponentialBuilder>,
    ) -> Result<Refreshed, AuthError> {
        let _guard = self.locks.acquire(subject_id).await;
        self.refresh_locked(subject_id, retry).await
    }

    /// Caller holds the subject lock. The row is re-read here so a refresh
    /// that completed while we waited is reused instead of repeated.
    async fn refresh_locked(
        &self,
        subject_id: SubjectId,
        retry: Option<ExponentialBuilder>,
    ) -> Result<Refreshed, AuthError> {
        let cred = self
            .store
            .find_by_subject(subject_id)
            .await?
            .ok_or(AuthError::NoCredential)?;
        if !cred.authorized {
            return Err(AuthError::ReauthorizationRequired);
        }
        if let Some(token) = cred.fresh_access_token(Utc::now(), self.settings.staleness_buffer) {
            return Ok(Refreshed::AlreadyFresh(token.to_string()));
        }
        let Some(refresh_token) = cred.refresh_token.as_deref() else {
            warn!(subject_id, "No refresh token stored; reauthorization required");
            return Err(AuthError::ReauthorizationRequired);
        };

        let tokens = match self.call_refresh(subject_id, refresh_token, retry).await {
            Ok(tokens) => tokens,
            Err(e) if e.is_rejection() => {
                if self.store.mark_unauthorized(subject_id, refresh_token).await? {
                    warn!(subject_id, error = %e, "Refresh token rejected; marking unauthorized");
                    return Err(AuthError::ReauthorizationRequired);
                }
                warn!(subject_id, "Rejected refresh token was already replaced; using stored token");
                return self.stored_fresh_token(subject_id).await;
            }
            Err(e) => return Err(AuthError::Transient(e.to_string())),
        };

        let update = TokenUpdate {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            access_token_expiry: tokens.expiry_from(Utc::now()),
        };
        if self
            .store
            .update_tokens(subject_id, refresh_token, update)
            .await?
        {
            return Ok(Refreshed::Rotated(tokens.access_token));
        }

        // Another process rotated the row between our read and write.
        warn!(subject_id, "Credential changed during refresh; using stored token");
        self.stored_fresh_token(subject_id).await
    }

    async fn stored_fresh_token(&self, subject_id: SubjectId) -> Result<Refreshed, AuthError> {
        self.store
            .find_by_subject(subject_id)
            .await?
            .filter(|c| c.authorized)
            .and_then(|c| {
                c.fresh_access_token(Utc::now(), self.settings.staleness_buffer)
                    .map(str::to_string)
            })
            .map(Refreshed::AlreadyFresh)
            .ok_or_else(|| AuthError::Transient("credential changed during refresh".to_string()))
    }

    async fn call_refresh(
        &self,
        subject_id: SubjectId,
        refresh_token: &str,
        retry: Option<ExponentialBuilder>,
    ) -> Result<TokenSet, ProviderError> {
        let Some(policy) = retry else {
            return self.provider.refresh_access_token(refresh_token).await;
        };
        (|| self.provider.refresh_access_token(refresh_token))
            .retry(policy)
            .when(ProviderError::is_retryable)
            .notify(|err, dur: Duration| {
                warn!(
                    subject_id,
                    error = %err,
                    "Google token refresh retrying after {:?}",
                    dur
                );
            })
            .await
    }
}
