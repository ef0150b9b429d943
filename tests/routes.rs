mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chameleon_drive_auth::middleware::AccessKeys;
use chameleon_drive_auth::router::{AppState, app_router};
use common::*;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use url::Url;

const API_KEY: &str = "platform-key";
const CRON_SECRET: &str = "cron-secret";

async fn app() -> (Router, Arc<TestLifecycle>, FakeProvider) {
    let (lc, provider) = lifecycle().await;
    let lc = Arc::new(lc);
    let keys = AccessKeys {
        api_key: Arc::from(API_KEY),
        cron_secret: Arc::from(CRON_SECRET),
    };
    let frontend = Url::parse("https://chameleon.example").unwrap();
    let state = AppState::new(lc.clone(), keys, &frontend).unwrap();
    (app_router(state), lc, provider)
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

fn location(resp: &axum::response::Response) -> Url {
    let loc = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header");
    Url::parse(loc).expect("absolute location")
}

fn query(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

async fn json_body(resp: axum::response::Response) -> Value {
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&body).expect("json body")
}

#[tokio::test]
async fn cron_route_requires_secret() {
    let (app, _, _) = app().await;

    let resp = app
        .clone()
        .oneshot(get("/cron/token-refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(
            get("/cron/token-refresh")
                .header("x-cron-secret", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cron_route_reports_batch_counts() {
    let (app, lc, provider) = app().await;
    link_admin(&lc, &provider, 1, "g-1", Some("rt-1"), Duration::from_secs(60)).await;
    link_admin(&lc, &provider, 2, "g-2", Some("rt-2"), Duration::from_secs(60)).await;
    provider.script_refresh("rt-2", RefreshScript::Reject);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cron/token-refresh")
                .header(header::AUTHORIZATION, format!("Bearer {CRON_SECRET}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["refreshedCount"], 1);
    assert_eq!(body["failedCount"], 1);
    assert_eq!(body["totalUsers"], 2);
    assert_eq!(body["results"][1]["status"], "failed");
    assert!(!body.to_string().contains("rt-1"));
}

#[tokio::test]
async fn consent_redirect_and_callback_link_the_admin() {
    let (app, lc, provider) = app().await;
    lc.store().put_account(42, true, false).await.unwrap();

    let resp = app
        .clone()
        .oneshot(get("/drive/auth?userId=42").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            get("/drive/auth?userId=42")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let state = query(&location(&resp), "state").expect("state");

    provider.add_code("abc", Some("rt"), Duration::from_secs(3600), Some(identity("g-42")));
    let callback = format!(
        "/drive/auth/callback?code=abc&state={}",
        url::form_urlencoded::byte_serialize(state.as_bytes()).collect::<String>()
    );
    let resp = app
        .clone()
        .oneshot(get(&callback).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let back = location(&resp);
    assert_eq!(back.path(), "/drive");
    assert_eq!(
        query(&back, "success").as_deref(),
        Some("Google Drive connected successfully")
    );

    let resp = app
        .oneshot(
            get("/drive/auth/42/status")
                .header(header::AUTHORIZATION, format!("Bearer {API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["authorized"], true);
    assert_eq!(body["google_email"], "g-42@gmail.example");
}

#[tokio::test]
async fn callback_failures_redirect_with_reason() {
    let (app, _, _) = app().await;

    let resp = app
        .clone()
        .oneshot(
            get("/drive/auth/callback?error=access_denied")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        query(&location(&resp), "error").as_deref(),
        Some("OAuth authorization was denied")
    );

    let resp = app
        .clone()
        .oneshot(
            get("/drive/auth/callback?state=x.y")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        query(&location(&resp), "error").as_deref(),
        Some("No authorization code received")
    );

    let resp = app
        .oneshot(
            get("/drive/auth/callback?code=abc&state=forged.state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let reason = query(&location(&resp), "error").unwrap();
    assert!(reason.starts_with("Invalid authorization request"));
}

#[tokio::test]
async fn status_and_revoke_routes() {
    let (app, lc, provider) = app().await;

    let resp = app
        .clone()
        .oneshot(
            get("/drive/auth/7/status")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["error"]["code"], "NO_CREDENTIAL");

    link_admin(&lc, &provider, 7, "g-7", Some("rt"), Duration::from_secs(3600)).await;
    let resp = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/drive/auth/7")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(provider.revoked(), vec!["rt".to_string()]);
}
