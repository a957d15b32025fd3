mod common;

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower::ServiceExt;

use common::{gateway, get_json, spawn_vendor, Hits, STABILITY_KEY};

const BALANCE_PATH: &str = "/v1/user/balance";

#[tokio::test]
async fn root_reports_health_and_key_status() {
    let app = gateway(&[("STABILITY_AI_API_KEY", STABILITY_KEY)]);

    let (status, body) = get_json(app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["provider"], "stability");
    assert_eq!(body["apiKeyStatus"], "valid format");
}

#[tokio::test]
async fn missing_key_is_reported_without_contacting_vendor() {
    let hits = Hits::default();
    let counter = hits.clone();
    let base = spawn_vendor(Router::new().route(
        BALANCE_PATH,
        get(move || {
            let counter = counter.clone();
            async move {
                counter.bump();
                Json(json!({"credits": 1.0}))
            }
        }),
    ));
    let app = gateway(&[("IMAGE_PROVIDER", "stability"), ("PROVIDER_BASE_URL", base.as_str())]);

    let (status, body) = get_json(app, "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_key_configured"], false);
    assert_eq!(body["api_key_format"], "missing");
    assert!(body["credential_issue"].as_str().unwrap().contains("STABILITY_AI_API_KEY"));
    assert_eq!(body["vendor"]["status"], "unknown");
    assert_eq!(hits.count(), 0);
}

#[tokio::test]
async fn probe_reports_remaining_credits() {
    let base = spawn_vendor(Router::new().route(BALANCE_PATH, get(|| async { Json(json!({"credits": 42.5})) })));
    let app = gateway(&[("STABILITY_AI_API_KEY", STABILITY_KEY), ("PROVIDER_BASE_URL", base.as_str())]);

    let (status, body) = get_json(app, "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_key_configured"], true);
    assert_eq!(body["api_key_format"], "valid");
    assert!(body["credential_issue"].is_null());
    assert_eq!(body["vendor"]["status"], "ok");
    assert_eq!(body["vendor"]["credits"], 42.5);
}

#[tokio::test]
async fn rejected_probe_degrades_to_vendor_error() {
    let base = spawn_vendor(Router::new().route(
        BALANCE_PATH,
        get(|| async { (StatusCode::UNAUTHORIZED, r#"{"message":"bad key"}"#) }),
    ));
    let app = gateway(&[("STABILITY_AI_API_KEY", STABILITY_KEY), ("PROVIDER_BASE_URL", base.as_str())]);

    let (status, body) = get_json(app, "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vendor"]["status"], "error");
    assert!(body["vendor"]["message"].as_str().unwrap().contains("bad key"));
}

#[tokio::test]
async fn unreachable_vendor_still_answers() {
    let app = gateway(&[
        ("STABILITY_AI_API_KEY", STABILITY_KEY),
        ("PROVIDER_BASE_URL", "http://127.0.0.1:1"),
    ]);

    let (status, body) = get_json(app, "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["vendor"]["status"], "error");
}

#[tokio::test]
async fn slow_probe_is_cut_short() {
    let base = spawn_vendor(Router::new().route(
        BALANCE_PATH,
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"credits": 1.0}))
        }),
    ));
    let app = gateway(&[
        ("STABILITY_AI_API_KEY", STABILITY_KEY),
        ("PROVIDER_BASE_URL", base.as_str()),
        ("STATUS_PROBE_TIMEOUT_SECS", "1"),
    ]);

    let started = Instant::now();
    let (status, body) = get_json(app, "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vendor"]["status"], "unknown");
    assert!(started.elapsed() < Duration::from_millis(2500));
}

#[tokio::test]
async fn local_provider_needs_no_credential() {
    let base = spawn_vendor(Router::new().route(
        "/system_stats",
        get(|| async { Json(json!({"system": {"os": "posix"}, "devices": [{"name": "cuda:0", "type": "cuda"}]})) }),
    ));
    let app = gateway(&[("IMAGE_PROVIDER", "local"), ("COMFYUI_URL", base.as_str())]);

    let (_, root) = get_json(app.clone(), "/").await;
    assert_eq!(root["apiKeyStatus"], "not required");

    let (status, body) = get_json(app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "local");
    assert_eq!(body["api_key_format"], "not_required");
    assert_eq!(body["vendor"]["device"], "cuda");
}

#[tokio::test]
async fn status_never_generates() {
    let hits = Hits::default();
    let counter = hits.clone();
    let base = spawn_vendor(
        Router::new()
            .route(BALANCE_PATH, get(|| async { Json(json!({"credits": 3.0})) }))
            .route(
                "/v2beta/stable-image/generate/sd3",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.bump();
                        StatusCode::OK
                    }
                }),
            ),
    );
    let app = gateway(&[("STABILITY_AI_API_KEY", STABILITY_KEY), ("PROVIDER_BASE_URL", base.as_str())]);

    let _ = get_json(app.clone(), "/api/status").await;
    let _ = get_json(app, "/api/status").await;

    assert_eq!(hits.count(), 0);
}

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/api/generate")
        .header("origin", origin)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn preflight_from_known_frontend_is_allowed() {
    let app = gateway(&[("STABILITY_AI_API_KEY", STABILITY_KEY)]);

    let response = app.oneshot(preflight("http://localhost:5173")).await.unwrap();

    assert!(response.status().is_success());
    let allowed = response.headers().get("access-control-allow-origin").unwrap();
    assert_eq!(allowed, "http://localhost:5173");
    assert_eq!(response.headers().get("access-control-allow-credentials").unwrap(), "true");
}

#[tokio::test]
async fn preflight_from_unknown_origin_gets_no_grant() {
    let app = gateway(&[("STABILITY_AI_API_KEY", STABILITY_KEY)]);

    let response = app.oneshot(preflight("https://evil.example")).await.unwrap();

    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn configured_origins_replace_defaults() {
    let app = gateway(&[
        ("STABILITY_AI_API_KEY", STABILITY_KEY),
        ("CORS_ALLOWED_ORIGINS", "https://gallery.example"),
    ]);

    let response = app.clone().oneshot(preflight("https://gallery.example")).await.unwrap();
    assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "https://gallery.example");

    let response = app.oneshot(preflight("http://localhost:5173")).await.unwrap();
    assert!(response.headers().get("access-control-allow-origin").is_none());
}
