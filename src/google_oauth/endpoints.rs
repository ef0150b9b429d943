use crate::config::GoogleConfig;
use crate::error::AuthError;
use crate::google_oauth::provider::{AuthorizationProvider, GoogleIdentity, ProviderError, TokenSet};

use oauth2::http::StatusCode;
use oauth2::{
    AsyncHttpClient, AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret,
    CsrfToken, EmptyExtraTokenFields, EndpointNotSet, EndpointSet, HttpClientError, HttpRequest,
    HttpResponse, RedirectUrl, RefreshToken, Scope, StandardRevocableToken, StandardTokenResponse,
    TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

/// Google OAuth endpoints backed by a shared HTTP client.
pub struct GoogleOauthEndpoints {
    oauth: GoogleOauth2Client,
    http: reqwest::Client,
    scopes: Vec<String>,
    userinfo_url: Url,
    revoke_url: Url,
}

impl GoogleOauthEndpoints {
    /// Build the endpoints; misconfigured URLs fail here, at startup.
    pub fn new(cfg: &GoogleConfig, http: reqwest::Client) -> Result<Self, AuthError> {
        let oauth = OAuth2Client::new(ClientId::new(cfg.client_id.clone()))
            .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(cfg.auth_url.clone())?)
            .set_token_uri(TokenUrl::new(cfg.token_url.clone())?)
            .set_redirect_uri(RedirectUrl::new(cfg.redirect_uri.clone())?);
        Ok(Self {
            oauth,
            http,
            scopes: cfg.scopes.clone(),
            userinfo_url: Url::parse(&cfg.userinfo_url)?,
            revoke_url: Url::parse(&cfg.revoke_url)?,
        })
    }
}

impl AuthorizationProvider for GoogleOauthEndpoints {
    fn authorization_url(&self, state: &str) -> Url {
        let state = state.to_string();
        let (url, _csrf) = self
            .oauth
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, ProviderError> {
        let token: GoogleTokenResponse = self
            .oauth
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .request_async(&|req: HttpRequest| send_token_request(self.http.clone(), req))
            .await?;
        info!("Authorization code exchanged successfully");
        Ok(token_set(&token))
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        let token: GoogleTokenResponse = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_owned()))
            .request_async(&|req: HttpRequest| send_token_request(self.http.clone(), req))
            .await?;
        debug!("Access token refreshed");
        Ok(token_set(&token))
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<GoogleIdentity, ProviderError> {
        let info: UserInfoResponse = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let account_id = info.id.filter(|s| !s.trim().is_empty());
        let email = info.email.filter(|s| !s.trim().is_empty());
        match (account_id, email) {
            (Some(account_id), Some(email)) => Ok(GoogleIdentity { account_id, email }),
            _ => Err(ProviderError::Parse(
                "userinfo response missing id or email".to_string(),
            )),
        }
    }

    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError> {
        self.http
            .post(self.revoke_url.clone())
            .form(&[("token", token)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Token endpoint transport. Overload and gateway statuses surface as request
/// failures so their bodies (HTML pages, `temporarily_unavailable`) are never
/// read as a verdict on the grant.
async fn send_token_request(
    http: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, HttpClientError<reqwest::Error>> {
    let response = http.call(request).await?;
    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(HttpClientError::Other(format!("token endpoint returned {status}")));
    }
    Ok(response)
}

fn token_set(token: &GoogleTokenResponse) -> TokenSet {
    TokenSet {
        access_token: token.access_token().secret().clone(),
        refresh_token: token.refresh_token().map(|t| t.secret().clone()),
        expires_in: token.expires_in(),
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    id: Option<String>,
    email: Option<String>,
}

type GoogleTokenResponse = StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType>;

type GoogleOauth2Client = OAuth2Client<
    BasicErrorResponse,
    GoogleTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;
