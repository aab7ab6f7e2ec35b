//! Byte-level forwarding to upstream backends.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error as ClientError};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use url::Url;

use crate::proxy::ProxyError;

/// Errors surfaced while delegating a request upstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The selected backend has no forwarding handle. Handles exist for
    /// every configured target and are never dropped, so this indicates a
    /// backend key that was never configured.
    #[error("no forwarding handle for backend {0}")]
    UnknownBackend(String),

    #[error("invalid upstream uri: {0}")]
    Uri(#[from] axum::http::uri::InvalidUriParts),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] ClientError),
}

/// The capability that carries a request to a chosen backend and returns
/// its response.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        backend: &str,
        request: Request<Body>,
    ) -> Result<Response<Body>, ForwardError>;
}

/// Production forwarder: rewrites the request URI to the backend's
/// authority and delegates to a pooled hyper client.
pub struct HttpForwarder {
    /// Backend key → authority. Built once at startup; entries survive a
    /// backend leaving the balancing rotation.
    targets: HashMap<String, Authority>,
    client: Client<HttpConnector, Body>,
}

/// Stable backend key for a configured target: its `host:port` authority.
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

impl HttpForwarder {
    pub fn new(target_urls: &[Url]) -> Result<Self, ProxyError> {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let mut targets = HashMap::new();
        for url in target_urls {
            let key = host_key(url);
            let authority =
                Authority::from_str(&key).map_err(|err| ProxyError::InvalidTarget {
                    url: url.to_string(),
                    reason: err.to_string(),
                })?;
            targets.insert(key, authority);
        }

        Ok(Self { targets, client })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        backend: &str,
        request: Request<Body>,
    ) -> Result<Response<Body>, ForwardError> {
        let authority = self
            .targets
            .get(backend)
            .ok_or_else(|| ForwardError::UnknownBackend(backend.to_string()))?;

        let (mut parts, body) = request.into_parts();
        let mut uri_parts = parts.uri.into_parts();
        // Upstream TLS is out of scope, targets are validated as http.
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(authority.clone());
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        parts.uri = Uri::from_parts(uri_parts)?;

        let response = self.client.request(Request::from_parts(parts, body)).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_uses_explicit_port() {
        let url = Url::parse("http://127.0.0.1:3000/ignored").unwrap();
        assert_eq!(host_key(&url), "127.0.0.1:3000");
    }

    #[test]
    fn host_key_falls_back_to_default_port() {
        let url = Url::parse("http://backend.internal").unwrap();
        assert_eq!(host_key(&url), "backend.internal:80");
    }

    #[tokio::test]
    async fn unconfigured_backend_is_an_error() {
        let forwarder = HttpForwarder::new(&[]).unwrap();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let err = forwarder.forward("127.0.0.1:1", request).await.unwrap_err();
        assert!(matches!(err, ForwardError::UnknownBackend(_)));
    }
}
