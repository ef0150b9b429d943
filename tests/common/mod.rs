#![allow(dead_code)]

use chameleon_drive_auth::db::{CredentialsStorage, SubjectId};
use chameleon_drive_auth::google_oauth::{
    AuthorizationProvider, GoogleIdentity, ProviderError, StateSigner, TokenSet,
};
use chameleon_drive_auth::service::{LifecycleSettings, TokenLifecycle};
use chameleon_drive_auth::types::RefreshSummary;
use backon::ExponentialBuilder;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const STATE_SECRET: &[u8] = b"test-state-secret";

pub type TestLifecycle = TokenLifecycle<CredentialsStorage, CredentialsStorage, FakeProvider>;

/// How the fake token endpoint answers a refresh.
#[derive(Debug, Clone)]
pub enum RefreshScript {
    Issue {
        rotate_refresh_token: bool,
        expires_in: Duration,
    },
    Reject,
    Transport,
}

#[derive(Default)]
struct FakeState {
    /// code -> (tokens, identity reported for the access token)
    codes: HashMap<String, (TokenSet, Option<GoogleIdentity>)>,
    refresh: HashMap<String, RefreshScript>,
    revoked: Vec<String>,
    minted: usize,
}

/// Scripted stand-in for Google's OAuth endpoints.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
    exchange_calls: Arc<AtomicUsize>,
    refresh_calls: Arc<AtomicUsize>,
    refresh_delay: Arc<Mutex<Duration>>,
}

impl FakeProvider {
    pub fn add_code(
        &self,
        code: &str,
        refresh_token: Option<&str>,
        expires_in: Duration,
        identity: Option<GoogleIdentity>,
    ) {
        let tokens = TokenSet {
            access_token: format!("access-{code}"),
            refresh_token: refresh_token.map(str::to_string),
            expires_in: Some(expires_in),
        };
        self.state
            .lock()
            .unwrap()
            .codes
            .insert(code.to_string(), (tokens, identity));
    }

    pub fn script_refresh(&self, refresh_token: &str, script: RefreshScript) {
        self.state
            .lock()
            .unwrap()
            .refresh
            .insert(refresh_token.to_string(), script);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> Vec<String> {
        self.state.lock().unwrap().revoked.clone()
    }
}

impl AuthorizationProvider for FakeProvider {
    fn authorization_url(&self, state: &str) -> Url {
        let mut url = Url::parse("https://accounts.example.test/auth").unwrap();
        url.query_pairs_mut()
            .append_pair("state", state)
            .append_pair("access_type", "offline");
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, ProviderError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .codes
            .get(code)
            .map(|(tokens, _)| tokens.clone())
            .ok_or_else(|| ProviderError::Rejected {
                error: "invalid_grant".to_string(),
            })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        let script = state.refresh.get(refresh_token).cloned().unwrap_or(RefreshScript::Issue {
            rotate_refresh_token: false,
            expires_in: Duration::from_secs(3600),
        });
        match script {
            RefreshScript::Issue {
                rotate_refresh_token,
                expires_in,
            } => {
                state.minted += 1;
                Ok(TokenSet {
                    access_token: format!("refreshed-{}", state.minted),
                    refresh_token: rotate_refresh_token
                        .then(|| format!("{refresh_token}-r{}", state.minted)),
                    expires_in: Some(expires_in),
                })
            }
            RefreshScript::Reject => Err(ProviderError::Rejected {
                error: "invalid_grant".to_string(),
            }),
            RefreshScript::Transport => {
                Err(ProviderError::Transport("connection reset".to_string()))
            }
        }
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<GoogleIdentity, ProviderError> {
        let state = self.state.lock().unwrap();
        state
            .codes
            .values()
            .find(|(tokens, _)| tokens.access_token == access_token)
            .and_then(|(_, identity)| identity.clone())
            .ok_or_else(|| ProviderError::Rejected {
                error: "401 Unauthorized".to_string(),
            })
    }

    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError> {
        self.state.lock().unwrap().revoked.push(token.to_string());
        Ok(())
    }
}

pub fn identity(account_id: &str) -> GoogleIdentity {
    GoogleIdentity {
        account_id: account_id.to_string(),
        email: format!("{account_id}@gmail.example"),
    }
}

pub fn test_settings() -> LifecycleSettings {
    LifecycleSettings {
        staleness_buffer: chrono::Duration::minutes(10),
        concurrency: 4,
        rate_limit_per_minute: NonZeroU32::new(10_000).unwrap(),
        credential_timeout: Duration::from_secs(5),
        batch_timeout: Duration::from_secs(30),
        retry_policy: ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_max_times(2),
    }
}

pub async fn storage() -> CredentialsStorage {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let storage = CredentialsStorage::new(pool);
    storage.init_schema().await.expect("schema");
    storage
}

pub async fn lifecycle() -> (TestLifecycle, FakeProvider) {
    lifecycle_with(test_settings()).await
}

pub async fn lifecycle_with(settings: LifecycleSettings) -> (TestLifecycle, FakeProvider) {
    let storage = storage().await;
    let provider = FakeProvider::default();
    let lc = TokenLifecycle::new(
        storage.clone(),
        storage,
        provider.clone(),
        StateSigner::new(STATE_SECRET, chrono::Duration::minutes(10)),
        settings,
    );
    (lc, provider)
}

/// The `state` query parameter of a consent URL.
pub fn state_from(url: &Url) -> String {
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state in consent url")
}

/// Run a full begin/complete round trip for an admin subject.
pub async fn link_admin(
    lc: &TestLifecycle,
    provider: &FakeProvider,
    subject_id: SubjectId,
    account_id: &str,
    refresh_token: Option<&str>,
    expires_in: Duration,
) {
    lc.store()
        .put_account(subject_id, true, false)
        .await
        .expect("account");
    let code = format!("code-{subject_id}-{account_id}");
    provider.add_code(&code, refresh_token, expires_in, Some(identity(account_id)));
    let state = state_from(&lc.begin_authorization(subject_id).expect("url"));
    lc.complete_authorization(&code, &state)
        .await
        .expect("link succeeds");
}

pub fn counts(summary: &RefreshSummary) -> (usize, usize, usize, usize) {
    (
        summary.refreshed,
        summary.skipped,
        summary.failed,
        summary.total,
    )
}
