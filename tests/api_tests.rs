mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use tower::ServiceExt;

use hootbank::api::router::create_router;
use hootbank::config::AppConfig;
use hootbank::AppState;

use common::{harness, Harness, DELAY, SAFE};

fn test_config(api_token: Option<&str>) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        api_token: api_token.map(str::to_string),
        chain_id: 100,
        rpc_url: "http://localhost:8545".into(),
        private_key: None,
        receipt_poll_interval: Duration::from_millis(10),
        safe_address: SAFE,
        delay_module_address: DELAY,
        settlement_address: hootbank::chain::GPV2_SETTLEMENT,
        sell_token_address: common::SELL_TOKEN,
        buy_token_address: common::BUY_TOKEN,
        orderbook_api_url: "http://localhost".into(),
        order_poll_interval: Duration::from_millis(10),
        explorer_url: "https://explorer.cow.fi/gc".into(),
    }
}

fn build_test_app(h: &Harness, api_token: Option<&str>) -> axum::Router {
    // A local recorder handle; installing a global recorder would clash
    // between tests running in the same process.
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

    let state = AppState {
        config: test_config(api_token),
        ws_tx: h.ws_tx.clone(),
        metrics_handle,
        deposits: h.service.clone(),
    };
    create_router(state)
}

async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness();
    let app = build_test_app(&h, None);

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["chain_id"], 100);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = harness();
    let app = build_test_app(&h, None);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let h = harness();
    let app = build_test_app(&h, Some("secret"));

    let (status, body) = call(&app, "GET", "/api/deposit", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/deposit")
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Public routes stay open
    let (status, _) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_quote_endpoint() {
    let h = harness();
    let app = build_test_app(&h, None);

    let (status, body) = call(&app, "POST", "/api/deposit/quote", Some(json!({ "amount": "100" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ready");
    assert_eq!(body["data"]["quote"]["summary"], "Sell 100 EURe, get 95 sDAI");
    assert_eq!(body["data"]["quote"]["buy_amount"], "95");

    let (status, body) = call(&app, "POST", "/api/deposit/quote", Some(json!({ "amount": "" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "empty");
    assert!(body["data"]["quote"].is_null());
    assert_eq!(h.book.quote_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_amount_returns_400() {
    let h = harness();
    let app = build_test_app(&h, None);

    let (status, body) = call(&app, "POST", "/api/deposit/quote", Some(json!({ "amount": "1.5.0" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_order_without_quote_returns_400() {
    let h = harness();
    let app = build_test_app(&h, None);

    let (status, _) = call(&app, "POST", "/api/deposit/order", Some(json!({ "amount": "100" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/deposit/order", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_rejection_returns_502() {
    let h = harness();
    h.book.reject_orders.store(true, Ordering::SeqCst);
    let app = build_test_app(&h, None);

    call(&app, "POST", "/api/deposit/quote", Some(json!({ "amount": "100" }))).await;
    let (status, body) = call(&app, "POST", "/api/deposit/order", Some(json!({ "amount": "100" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("InsufficientBalance"));
}

#[tokio::test]
async fn test_deposit_lifecycle_over_http() {
    let h = harness();
    let app = build_test_app(&h, None);

    // Nothing to queue yet
    let (status, _) = call(&app, "POST", "/api/deposit/queue", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    call(&app, "POST", "/api/deposit/quote", Some(json!({ "amount": "100" }))).await;
    let (status, body) = call(&app, "POST", "/api/deposit/order", Some(json!({ "amount": "100" }))).await;
    assert_eq!(status, StatusCode::OK);
    let uid = body["data"]["order_uid"].as_str().unwrap().to_string();
    assert!(body["data"]["explorer_url"]
        .as_str()
        .unwrap()
        .ends_with(&format!("/orders/{uid}")));

    let (status, body) = call(&app, "GET", "/api/deposit/order", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order_uid"], uid.as_str());

    let (status, body) = call(&app, "POST", "/api/deposit/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["tx_hash"].as_str().unwrap().starts_with("0x"));

    // Default mock cooldown is an hour
    let (status, body) = call(&app, "POST", "/api/deposit/execute", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("cooldown"));

    let (status, _) = call(&app, "POST", "/api/deposit/reset", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, "GET", "/api/deposit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stage"], "cooldown_pending");
    assert_eq!(body["data"]["relay"], "cooldown_pending");
    assert_eq!(body["data"]["order_uid"], uid.as_str());
    assert_eq!(body["data"]["quote"]["sell_token"], "EURe");
}

#[tokio::test]
async fn test_account_endpoint() {
    let h = harness();
    let app = build_test_app(&h, None);

    let (status, body) = call(&app, "GET", "/api/account", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["module_enabled"], true);
    assert_eq!(body["data"]["cooldown_secs"], 3600);
    assert_eq!(body["data"]["balances"][0]["balance"], "250");
    assert_eq!(body["data"]["balances"][1]["symbol"], "sDAI");
}
