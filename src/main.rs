use chameleon_drive_auth::GoogleTokenLifecycle;
use chameleon_drive_auth::config::Config;
use chameleon_drive_auth::db::CredentialsStorage;
use chameleon_drive_auth::google_oauth::{GoogleOauthEndpoints, StateSigner};
use chameleon_drive_auth::middleware::AccessKeys;
use chameleon_drive_auth::router::{AppState, app_router};
use chameleon_drive_auth::service::{LifecycleSettings, scheduler};
use mimalloc::MiMalloc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        proxy = %cfg.basic.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.basic.loglevel,
        listen_addr = %cfg.basic.listen_addr,
        refresh_interval_secs = cfg.refresh.interval_secs,
    );

    let mut builder = reqwest::Client::builder()
        .user_agent("chameleon-drive-auth/0.1")
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(cfg.google.request_timeout_secs))
        // oauth2 requires redirects to be disabled for token requests
        .redirect(reqwest::redirect::Policy::none());
    if let Some(proxy_url) = cfg.basic.proxy.as_ref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    let http = builder.build()?;

    let storage = CredentialsStorage::connect(&cfg.basic.database_url).await?;
    let provider = GoogleOauthEndpoints::new(&cfg.google, http)?;
    let signer = StateSigner::new(cfg.basic.state_secret.as_bytes(), cfg.refresh.state_ttl());
    let lifecycle = Arc::new(GoogleTokenLifecycle::new(
        storage.clone(),
        storage,
        provider,
        signer,
        LifecycleSettings::from(&cfg.refresh),
    ));

    let sweeper = scheduler::spawn(
        lifecycle.clone(),
        Duration::from_secs(cfg.refresh.interval_secs),
    );

    let keys = AccessKeys {
        api_key: Arc::from(cfg.basic.api_key.as_str()),
        cron_secret: Arc::from(cfg.basic.cron_secret.as_str()),
    };
    let state = AppState::new(lifecycle, keys, &cfg.basic.frontend_url)?;
    let app = app_router(state);

    let listener = TcpListener::bind(cfg.basic.listen_addr.as_str()).await?;
    info!("HTTP server listening on {}", cfg.basic.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}
