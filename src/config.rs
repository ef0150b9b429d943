use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URI: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const GOOGLE_REVOKE_URI: &str = "https://oauth2.googleapis.com/revoke";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top level configuration, layered as defaults <- `config.toml` <- `CHAMELEON_*` env.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub google: GoogleConfig,
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    /// Shared key required by the platform-facing routes.
    pub api_key: String,
    /// Shared secret presented by the scheduled invoker.
    pub cron_secret: String,
    /// HMAC key for the OAuth `state` parameter.
    pub state_secret: String,
    pub frontend_url: Url,
    pub proxy: Option<Url>,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite://chameleon.db".to_string(),
            loglevel: "info".to_string(),
            api_key: String::new(),
            cron_secret: String::new(),
            state_secret: String::new(),
            frontend_url: Url::parse("http://localhost:3000").expect("static url"),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub revoke_url: String,
    pub scopes: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8000/drive/auth/callback".to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URI.to_string(),
            userinfo_url: GOOGLE_USERINFO_URI.to_string(),
            revoke_url: GOOGLE_REVOKE_URI.to_string(),
            scopes: vec![
                "https://www.googleapis.com/auth/drive.file".to_string(),
                "https://www.googleapis.com/auth/drive.appdata".to_string(),
                "https://www.googleapis.com/auth/userinfo.profile".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
            ],
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Tokens expiring within this window are treated as stale.
    pub staleness_buffer_secs: u64,
    /// Maximum age of an OAuth `state` value.
    pub state_ttl_secs: u64,
    pub concurrency: usize,
    pub rate_limit_per_minute: u32,
    pub credential_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    /// Period of the in-process refresh sweep; 0 disables it.
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            staleness_buffer_secs: 10 * 60,
            state_ttl_secs: 10 * 60,
            concurrency: 4,
            rate_limit_per_minute: 60,
            credential_timeout_secs: 30,
            batch_timeout_secs: 5 * 60,
            interval_secs: 30 * 60,
        }
    }
}

impl RefreshConfig {
    pub fn staleness_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_buffer_secs as i64)
    }

    pub fn state_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.state_ttl_secs as i64)
    }

    pub fn credential_timeout(&self) -> Duration {
        Duration::from_secs(self.credential_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

impl Config {
    /// Load from `config.toml` (or `$CHAMELEON_CONFIG`) and `CHAMELEON_*` env vars.
    pub fn load() -> Result<Self, figment::Error> {
        let path =
            std::env::var("CHAMELEON_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHAMELEON_").split("__"))
            .extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), figment::Error> {
        let required = [
            ("basic.api_key", &self.basic.api_key),
            ("basic.cron_secret", &self.basic.cron_secret),
            ("basic.state_secret", &self.basic.state_secret),
            ("google.client_id", &self.google.client_id),
            ("google.client_secret", &self.google.client_secret),
        ];
        if let Some((key, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(figment::Error::from(format!("`{key}` must be set")));
        }

        const DAY: u64 = 24 * 60 * 60;
        let r = &self.refresh;
        let bounded = [
            ("refresh.staleness_buffer_secs", r.staleness_buffer_secs, 0..=DAY),
            ("refresh.state_ttl_secs", r.state_ttl_secs, 1..=DAY),
            ("refresh.concurrency", r.concurrency as u64, 1..=256),
            ("refresh.rate_limit_per_minute", u64::from(r.rate_limit_per_minute), 1..=60_000),
            ("refresh.credential_timeout_secs", r.credential_timeout_secs, 1..=60 * 60),
            ("refresh.batch_timeout_secs", r.batch_timeout_secs, 1..=DAY),
            ("refresh.interval_secs", r.interval_secs, 0..=7 * DAY),
            ("google.request_timeout_secs", self.google.request_timeout_secs, 1..=5 * 60),
        ];
        match bounded.iter().find(|(_, v, range)| !range.contains(v)) {
            Some((key, v, range)) => Err(figment::Error::from(format!(
                "`{key}` = {v} is outside {}..={}",
                range.start(),
                range.end()
            ))),
            None => Ok(()),
        }
    }
}
