//! Boss regression tests.
//!
//! Drives the full router the daemon serves, against a mock pool and
//! against a static-roster pool backed by a real local worker.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{any, get};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use herd_api::build_router;
use herd_pool::{DispatchMode, MockPlatform, PoolOptions, StaticPlatform, WorkerPool};
use herd_proxy::Forwarder;

fn mock_pool(capacity: usize) -> WorkerPool {
    WorkerPool::new(
        Arc::new(MockPlatform::new()),
        DispatchMode::Mock,
        PoolOptions {
            capacity,
            acquire_timeout: Some(Duration::from_secs(2)),
        },
    )
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn text(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A stand-in worker listening on an ephemeral port.
async fn spawn_worker() -> u16 {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/run/{*path}",
            any(|req: Request<Body>| async move {
                let method = req.method().clone();
                let path = req.uri().path().to_string();
                let body = req.into_body().collect().await.unwrap().to_bytes();
                (
                    StatusCode::ACCEPTED,
                    format!("{method} {path} {}", String::from_utf8_lossy(&body)),
                )
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn static_pool(port: u16) -> WorkerPool {
    let platform = StaticPlatform::new(
        vec!["127.0.0.1".to_string()],
        port,
        "/healthz",
        Duration::from_millis(50),
        Duration::from_secs(2),
    );
    WorkerPool::new(
        Arc::new(platform),
        DispatchMode::Forward(Forwarder::new(port, Duration::from_secs(1), None)),
        PoolOptions {
            capacity: 1,
            acquire_timeout: Some(Duration::from_secs(2)),
        },
    )
}

#[tokio::test]
async fn mock_boss_scale_up_then_run() {
    let router = build_router(mock_pool(2));

    let resp = router.clone().oneshot(post("/api/v1/scale/up?wait=true")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = router.clone().oneshot(get_req("/run")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(text(resp).await, "hello from worker-0\n");

    let resp = router.oneshot(get_req("/api/v1/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let status: serde_json::Value = serde_json::from_str(&text(resp).await).unwrap();
    assert_eq!(status, serde_json::json!([{ "worker-0": "idle" }]));
}

#[tokio::test]
async fn mock_boss_capacity_two() {
    let router = build_router(mock_pool(2));
    for _ in 0..2 {
        let resp = router.clone().oneshot(post("/api/v1/scale/up")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }
    let resp = router.oneshot(post("/api/v1/scale/up")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn mock_boss_scale_down_empties_pool() {
    let pool = mock_pool(1);
    let router = build_router(pool.clone());
    router.clone().oneshot(post("/api/v1/scale/up?wait=true")).await.unwrap();

    let resp = router.clone().oneshot(post("/api/v1/scale/down")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&text(resp).await).unwrap();
    assert_eq!(body["data"]["worker"], "worker-0");
    assert_eq!(pool.size(), 0);

    let resp = router.oneshot(get_req("/api/v1/workers")).await.unwrap();
    let body: serde_json::Value = serde_json::from_str(&text(resp).await).unwrap();
    assert_eq!(body["data"]["summary"]["total"], 0);
}

#[tokio::test]
async fn closed_boss_rejects_dispatch() {
    let pool = mock_pool(1);
    let router = build_router(pool.clone());
    pool.close().await;

    let resp = router.oneshot(get_req("/run")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn static_boss_forwards_to_worker() {
    let port = spawn_worker().await;
    let pool = static_pool(port);
    let router = build_router(pool.clone());

    let resp = router.clone().oneshot(post("/api/v1/scale/up?wait=true")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = Request::builder()
        .method("PUT")
        .uri("/run/thumbnail?size=64")
        .body(Body::from("image-bytes"))
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(text(resp).await, "PUT /run/thumbnail image-bytes");

    assert_eq!(pool.summary().idle, 1);
}

#[tokio::test]
async fn unreachable_worker_returns_bad_gateway_and_recovers() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let pool = WorkerPool::new(
        Arc::new(MockPlatform::new()),
        DispatchMode::Forward(Forwarder::new(dead_port, Duration::from_secs(1), None)),
        PoolOptions {
            capacity: 1,
            acquire_timeout: Some(Duration::from_secs(2)),
        },
    );
    let router = build_router(pool.clone());
    router.clone().oneshot(post("/api/v1/scale/up?wait=true")).await.unwrap();

    for _ in 0..2 {
        let resp = router.clone().oneshot(get_req("/run/anything")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
    assert_eq!(pool.size(), 1);
    assert_eq!(pool.summary().idle, 1);
}
