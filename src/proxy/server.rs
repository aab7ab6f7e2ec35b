//! HTTP server setup and per-request dispatch.
//!
//! # Responsibilities
//! - Build the Axum router and middleware stack (admission limit, timeout,
//!   request IDs, tracing)
//! - Dispatch each request: derive the routing key, ask the strategy for a
//!   backend, bracket the forward with inc/done, annotate proxy headers
//! - Contain every forwarding failure to that request's 502 response

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::balancer::{self, Balancer};
use crate::config::ProxyConfig;
use crate::health::{HealthMonitor, LivenessMap};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::proxy::forwarder::{host_key, Forwarder, HttpForwarder};
use crate::proxy::ProxyError;

/// Marker value set on the `X-Proxy` header of every forwarded request.
pub const PROXY_MARKER: &str = "balance-proxy";

pub const X_REAL_IP: &str = "x-real-ip";
pub const X_PROXY: &str = "x-proxy";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub balancer: Arc<dyn Balancer>,
    pub forwarder: Arc<dyn Forwarder>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    balancer: Arc<dyn Balancer>,
    liveness: Arc<LivenessMap>,
    hosts: Vec<String>,
}

impl HttpServer {
    /// Wire the subsystems together from configuration.
    ///
    /// Fails fast on malformed backend targets and unknown algorithm
    /// names; nothing is spawned until [`HttpServer::run`].
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let mut targets = Vec::with_capacity(config.backends.len());
        for raw in &config.backends {
            let url = Url::parse(raw).map_err(|err| ProxyError::InvalidTarget {
                url: raw.clone(),
                reason: err.to_string(),
            })?;
            targets.push(url);
        }
        let hosts: Vec<String> = targets.iter().map(host_key).collect();

        let forwarder = Arc::new(HttpForwarder::new(&targets)?);
        let balancer = balancer::build(&config.balancer.algorithm, hosts.clone())?;
        let liveness = Arc::new(LivenessMap::new(&hosts));

        let state = AppState {
            balancer: balancer.clone(),
            forwarder,
        };
        let router = Self::build_router(&config, state);

        Ok(Self {
            router,
            config,
            balancer,
            liveness,
            hosts,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            // Admission gate: excess requests wait for a slot instead of
            // being rejected.
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_inflight))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    /// Run the server and the per-backend health monitors until shutdown.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            algorithm = %self.config.balancer.algorithm,
            backends = self.hosts.len(),
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(
            self.balancer.clone(),
            self.liveness.clone(),
            self.config.health_check.clone(),
        );
        monitor.spawn(self.hosts.clone(), &shutdown);

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Per-request dispatch.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let client_ip = client_ip(request.headers(), peer);

    let backend = match state.balancer.balance(&client_ip) {
        Ok(backend) => backend,
        Err(err) => {
            tracing::warn!(client_ip = %client_ip, error = %err, "balance failed");
            metrics::record_request(&method, StatusCode::BAD_GATEWAY.as_u16(), "none", start);
            return bad_gateway(format!("balance error: {err}"));
        }
    };

    // inc now, done on drop: exactly one done() on every exit path below,
    // including a panic caught at the boundary.
    let _inflight = InflightGuard::acquire(state.balancer.clone(), backend.clone());

    let headers = request.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&client_ip) {
        headers.insert(X_REAL_IP, value);
    }
    headers.insert(X_PROXY, HeaderValue::from_static(PROXY_MARKER));
    append_forwarded_for(headers, &peer.ip().to_string());

    tracing::debug!(
        client_ip = %client_ip,
        backend = %backend,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    // Failure boundary: forward errors and panics both end here, as a 502
    // for this request only.
    let outcome = AssertUnwindSafe(state.forwarder.forward(&backend, request))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(response)) => {
            metrics::record_request(&method, response.status().as_u16(), &backend, start);
            response
        }
        Ok(Err(err)) => {
            tracing::error!(backend = %backend, error = %err, "forwarding failed");
            metrics::record_request(&method, StatusCode::BAD_GATEWAY.as_u16(), &backend, start);
            bad_gateway(format!("forwarding error: {err}"))
        }
        Err(panic) => {
            let reason = panic_message(panic);
            tracing::error!(backend = %backend, reason = %reason, "forwarding panicked");
            metrics::record_request(&method, StatusCode::BAD_GATEWAY.as_u16(), &backend, start);
            bad_gateway(format!("proxy failure: {reason}"))
        }
    }
}

fn bad_gateway(reason: String) -> Response {
    (StatusCode::BAD_GATEWAY, reason).into_response()
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Extend the outbound `X-Forwarded-For` chain with the connecting peer,
/// preserving any hops recorded by proxies in front of this one.
fn append_forwarded_for(headers: &mut HeaderMap, peer_ip: &str) {
    let chain = match headers.get(X_FORWARDED_FOR).and_then(|value| value.to_str().ok()) {
        Some(existing) => format!("{existing}, {peer_ip}"),
        None => peer_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Routing key: first `X-Forwarded-For` hop when present, else the peer
/// address. Client identity keeps consistent-hash affinity stable across
/// fronting proxies.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Pairs one `inc` with exactly one `done` via Drop.
struct InflightGuard {
    balancer: Arc<dyn Balancer>,
    backend: String,
}

impl InflightGuard {
    fn acquire(balancer: Arc<dyn Balancer>, backend: String) -> Self {
        balancer.inc(&backend);
        Self { balancer, backend }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.balancer.done(&self.backend);
    }
}
