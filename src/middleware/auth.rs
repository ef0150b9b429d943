use axum::Json;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderMap, StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use headers::Authorization;
use headers::authorization::Bearer;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Shared secrets guarding the non-public routes.
#[derive(Clone)]
pub struct AccessKeys {
    pub api_key: Arc<str>,
    pub cron_secret: Arc<str>,
}

/// Accepts the secret as `Authorization: Bearer <secret>` or in `header_name`.
async fn ensure_secret<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
    header_name: &str,
    expected: &str,
) -> Result<(), Response> {
    if let Some(provided) = header_value(&parts.headers, header_name)
        && secret_matches(provided, expected)
    {
        return Ok(());
    }

    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
        && secret_matches(bearer.token(), expected)
    {
        return Ok(());
    }

    Err((
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"code": "UNAUTHORIZED", "message": "invalid or missing key"}})),
    )
        .into_response())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn secret_matches(provided: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

/// Platform routes: `x-api-key` or bearer.
#[derive(Debug, Clone, Copy)]
pub struct RequireApiKey;

impl<S> FromRequestParts<S> for RequireApiKey
where
    AccessKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = AccessKeys::from_ref(state);
        ensure_secret(parts, state, "x-api-key", &keys.api_key).await?;
        Ok(Self)
    }
}

/// Scheduled invoker: `x-cron-secret` or bearer.
#[derive(Debug, Clone, Copy)]
pub struct RequireCronSecret;

impl<S> FromRequestParts<S> for RequireCronSecret
where
    AccessKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = AccessKeys::from_ref(state);
        ensure_secret(parts, state, "x-cron-secret", &keys.cron_secret).await?;
        Ok(Self)
    }
}
