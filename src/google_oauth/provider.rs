use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use std::future::Future;
use thiserror::Error as ThisError;
use url::Url;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Tokens returned by a code exchange or a refresh.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<std::time::Duration>,
}

impl TokenSet {
    /// Absolute expiry of the access token as seen from `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lifetime = self
            .expires_in
            .and_then(|d| Duration::from_std(d).ok())
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        now + lifetime
    }
}

/// Identity of the linked Google account as reported by userinfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub account_id: String,
    pub email: String,
}

#[derive(Debug, ThisError)]
pub enum ProviderError {
    /// The grant itself is gone (`invalid_grant`): revoked, expired or never valid.
    #[error("provider rejected request: {error}")]
    Rejected { error: String },

    /// The provider refused our client or request shape (`invalid_client`, ...).
    #[error("provider refused client: {error}")]
    Refused { error: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    Parse(String),

    #[error("unexpected provider response: {0}")]
    Unexpected(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_) | ProviderError::Unexpected(_))
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ProviderError::Rejected { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                ProviderError::Transport(e.to_string())
            }
            Some(status) if status.is_client_error() => ProviderError::Rejected {
                error: status.to_string(),
            },
            _ if e.is_decode() => ProviderError::Parse(e.to_string()),
            _ => ProviderError::Transport(e.to_string()),
        }
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for ProviderError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => match err.error() {
                BasicErrorResponseType::InvalidGrant => ProviderError::Rejected {
                    error: err.error().to_string(),
                },
                BasicErrorResponseType::Extension(code)
                    if matches!(code.as_str(), "temporarily_unavailable" | "server_error") =>
                {
                    ProviderError::Transport(format!("token endpoint: {code}"))
                }
                other => ProviderError::Refused {
                    error: other.to_string(),
                },
            },
            RequestTokenError::Request(req_e) => {
                ProviderError::Transport(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => {
                ProviderError::Parse(parse_err.to_string())
            }
            RequestTokenError::Other(s) => ProviderError::Unexpected(s),
        }
    }
}

/// The external OAuth2 authorization provider.
pub trait AuthorizationProvider: Send + Sync + 'static {
    /// Consent URL carrying the given opaque `state`. Pure, no I/O.
    fn authorization_url(&self, state: &str) -> Url;

    fn exchange_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<TokenSet, ProviderError>> + Send;

    fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenSet, ProviderError>> + Send;

    fn fetch_userinfo(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<GoogleIdentity, ProviderError>> + Send;

    fn revoke_token(&self, token: &str) -> impl Future<Output = Result<(), ProviderError>> + Send;
}
