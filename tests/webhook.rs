// tests/webhook.rs
//
// Webhook delivery against a local axum server that records requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use parking_lot::Mutex;

use news_intel::notify::webhook::{WebhookConfig, WebhookSender};

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(HeaderMap, String)>>>,
    flaky_hits: Arc<AtomicUsize>,
}

async fn record(State(c): State<Captured>, headers: HeaderMap, body: String) -> StatusCode {
    c.requests.lock().push((headers, body));
    StatusCode::OK
}

/// 503 on the first hit, 200 afterwards.
async fn flaky(State(c): State<Captured>) -> StatusCode {
    if c.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn reject() -> StatusCode {
    StatusCode::BAD_REQUEST
}

async fn serve() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/news", post(record))
        .route("/flaky", post(flaky))
        .route("/reject", post(reject))
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), captured)
}

fn cfg(server_url: &str, topic: &str, token: &str) -> WebhookConfig {
    WebhookConfig {
        server_url: server_url.into(),
        topic: topic.into(),
        token: token.into(),
    }
}

#[tokio::test]
async fn posts_markdown_body_with_headers() {
    let (base, captured) = serve().await;
    let sender = WebhookSender::new(reqwest::Client::new());

    sender
        .send(&cfg(&base, "news", "secret"), "News digest - 2 items", "**1. A**")
        .await
        .unwrap();

    let reqs = captured.requests.lock();
    assert_eq!(reqs.len(), 1);
    let (headers, body) = &reqs[0];
    assert_eq!(body, "**1. A**");
    assert_eq!(headers["title"], "News digest - 2 items");
    assert_eq!(headers["markdown"], "yes");
    assert_eq!(headers["authorization"], "Bearer secret");
}

#[tokio::test]
async fn server_errors_are_retried() {
    let (base, captured) = serve().await;
    let sender = WebhookSender::new(reqwest::Client::new()).with_retries(3);

    sender.send(&cfg(&base, "flaky", ""), "t", "b").await.unwrap();
    assert_eq!(captured.flaky_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let (base, _captured) = serve().await;
    let sender = WebhookSender::new(reqwest::Client::new()).with_retries(3);

    let err = sender.send(&cfg(&base, "reject", ""), "t", "b").await.unwrap_err();
    assert!(err.to_string().contains("400"), "{err}");
}

#[tokio::test]
async fn missing_server_url_is_an_error() {
    let sender = WebhookSender::new(reqwest::Client::new());
    assert!(sender.send(&cfg("", "x", ""), "t", "b").await.is_err());
}
