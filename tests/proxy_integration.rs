//! End-to-end tests: proxy in front of raw mock backends.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;

use balance_proxy::config::ProxyConfig;
use balance_proxy::{HttpServer, Shutdown};

mod common;

fn client() -> Client<HttpConnector, Body> {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

async fn start_proxy(config: ProxyConfig, addr: SocketAddr) -> Shutdown {
    let listener = TcpListener::bind(addr).await.unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let run_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, run_shutdown).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown
}

async fn get(proxy: SocketAddr, path: &str, xff: Option<&str>) -> (StatusCode, String) {
    let mut builder = Request::builder().uri(format!("http://{proxy}{path}"));
    if let Some(xff) = xff {
        builder = builder.header("x-forwarded-for", xff);
    }
    let request = builder.body(Body::empty()).unwrap();
    let response = client().request(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(Body::new(response.into_body()), 1024 * 1024)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}

fn proxy_config(backends: &[SocketAddr], algorithm: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.backends = backends
        .iter()
        .map(|addr| format!("http://{addr}"))
        .collect();
    config.balancer.algorithm = algorithm.to_string();
    config
}

#[tokio::test]
async fn forwards_requests_to_a_backend() {
    let backend_addr: SocketAddr = "127.0.0.1:29181".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:29182".parse().unwrap();

    common::start_mock_backend(backend_addr, "hello from backend").await;
    let config = proxy_config(&[backend_addr], "random");
    let shutdown = start_proxy(config, proxy_addr).await;

    let (status, body) = get(proxy_addr, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello from backend");

    shutdown.trigger();
}

#[tokio::test]
async fn annotates_forwarded_requests_with_proxy_headers() {
    let backend_addr: SocketAddr = "127.0.0.1:29191".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:29192".parse().unwrap();

    common::start_echo_backend(backend_addr).await;
    let config = proxy_config(&[backend_addr], "random");
    let shutdown = start_proxy(config, proxy_addr).await;

    let (status, head) = get(proxy_addr, "/echo", Some("203.0.113.9")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(head.contains("x-proxy: balance-proxy"), "head: {head}");
    assert!(head.contains("x-real-ip: 203.0.113.9"), "head: {head}");
    // The connecting peer is appended to the forwarding chain.
    assert!(
        head.contains("x-forwarded-for: 203.0.113.9, 127.0.0.1"),
        "head: {head}"
    );

    shutdown.trigger();
}

#[tokio::test]
async fn admission_gate_delays_excess_requests_instead_of_rejecting() {
    let backend_addr: SocketAddr = "127.0.0.1:29221".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:29222".parse().unwrap();

    common::start_slow_backend(backend_addr, Duration::from_millis(500), "slow").await;
    let mut config = proxy_config(&[backend_addr], "random");
    config.listener.max_inflight = 1;
    let shutdown = start_proxy(config, proxy_addr).await;

    let started = std::time::Instant::now();
    let (first, second) = tokio::join!(get(proxy_addr, "/", None), get(proxy_addr, "/", None));
    let elapsed = started.elapsed();

    // Both requests are admitted; the gate never rejects.
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(first.1, "slow");
    assert_eq!(second.0, StatusCode::OK);
    assert_eq!(second.1, "slow");

    // With a single slot the second request waits for the first to finish.
    assert!(
        elapsed >= Duration::from_millis(1000),
        "requests overlapped: {elapsed:?}"
    );

    shutdown.trigger();
}

#[tokio::test]
async fn consistent_hash_keeps_client_affinity() {
    let b1: SocketAddr = "127.0.0.1:29201".parse().unwrap();
    let b2: SocketAddr = "127.0.0.1:29202".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:29203".parse().unwrap();

    common::start_mock_backend(b1, "one").await;
    common::start_mock_backend(b2, "two").await;
    let config = proxy_config(&[b1, b2], "consistent-hash");
    let shutdown = start_proxy(config, proxy_addr).await;

    let (_, first) = get(proxy_addr, "/", Some("198.51.100.4")).await;
    for _ in 0..5 {
        let (status, body) = get(proxy_addr, "/", Some("198.51.100.4")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, first);
    }

    shutdown.trigger();
}

#[tokio::test]
async fn health_transitions_drive_membership() {
    let backend_addr: SocketAddr = "127.0.0.1:29211".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:29212".parse().unwrap();

    // Backend starts dead; one failed probe must empty the membership.
    let mut config = proxy_config(&[backend_addr], "random");
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;
    let shutdown = start_proxy(config, proxy_addr).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let (status, body) = get(proxy_addr, "/", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("balance error"), "body: {body}");

    // Bring the backend up; the next successful probe restores it.
    common::start_mock_backend(backend_addr, "recovered").await;
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let (status, body) = get(proxy_addr, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "recovered");

    shutdown.trigger();
}
