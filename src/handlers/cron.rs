use crate::db::{AccountDirectory, CredentialStore};
use crate::google_oauth::AuthorizationProvider;
use crate::middleware::RequireCronSecret;
use crate::router::AppState;
use crate::types::RefreshReport;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronRefreshResponse {
    pub success: bool,
    pub message: String,
    pub refreshed_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub total_users: usize,
    pub results: Vec<RefreshReport>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CronFailureResponse {
    pub success: bool,
    pub message: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// GET|POST /cron/token-refresh
pub async fn token_refresh<S, A, P>(
    _auth: RequireCronSecret,
    State(state): State<AppState<S, A, P>>,
) -> Response
where
    S: CredentialStore,
    A: AccountDirectory,
    P: AuthorizationProvider,
{
    info!("Authorized cron invocation; refreshing admin tokens");
    match state.lifecycle.refresh_all_authorized().await {
        Ok(summary) => Json(CronRefreshResponse {
            success: true,
            message: "Token refresh completed successfully".to_string(),
            refreshed_count: summary.refreshed,
            skipped_count: summary.skipped,
            failed_count: summary.failed,
            total_users: summary.total,
            results: summary.results,
            timestamp: Utc::now(),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Cron token refresh failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CronFailureResponse {
                    success: false,
                    message: "Token refresh failed".to_string(),
                    error: e.reason().to_string(),
                    timestamp: Utc::now(),
                }),
            )
                .into_response()
        }
    }
}
