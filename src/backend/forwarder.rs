//! HTTP forwarder: relays a request to one backend instance

use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::{redirect, Client};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ForwarderConfig;
use crate::error::{AppError, Result};
use crate::registry::models::Instance;

/// Backend response relayed to the caller unchanged
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for ForwardedResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Outbound HTTP client for backend instances
///
/// Never retries and never falls back to another instance: a failed call is
/// reported as `BackendUnreachable` and the caller decides what to do.
pub struct Forwarder {
    client: Client,
    timeout: Duration,
}

impl Forwarder {
    /// Create a new forwarder from configuration
    pub fn new(config: &ForwarderConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// `instance.url + "/" + path`, with the query string appended when present
    pub fn target_url(instance: &Instance, path: &str, query: Option<&str>) -> String {
        let path = path.trim_start_matches('/');
        match query.filter(|q| !q.is_empty()) {
            Some(query) => format!("{}/{}?{}", instance.url, path, query),
            None => format!("{}/{}", instance.url, path),
        }
    }

    /// Forward a request to `instance` and return its response verbatim
    pub async fn forward(
        &self,
        instance: &Instance,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedResponse> {
        let url = Self::target_url(instance, path, query);

        debug!(instance = %instance.url, url = %url, method = %method, "Forwarding request");

        let response = self
            .client
            .request(method, &url)
            .headers(outbound_headers(headers))
            .body(body)
            .send()
            .await
            .map_err(|e| self.unreachable(instance, e))?;

        let status = response.status();
        let headers = relayed_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| self.unreachable(instance, e))?;

        debug!(
            instance = %instance.url,
            status = %status,
            bytes = body.len(),
            "Backend responded"
        );

        Ok(ForwardedResponse {
            status,
            headers,
            body,
        })
    }

    fn unreachable(&self, instance: &Instance, e: reqwest::Error) -> AppError {
        let reason = if e.is_timeout() {
            format!("timed out after {}ms", self.timeout.as_millis())
        } else if e.is_connect() {
            format!("connection failed: {}", error_chain(&e))
        } else {
            error_chain(&e)
        };

        warn!(instance = %instance.url, reason = %reason, "Backend unreachable");

        AppError::BackendUnreachable {
            url: instance.url.clone(),
            reason,
        }
    }
}

/// Headers that describe a single connection and must not be relayed
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Inbound headers minus hop-by-hop ones, `Host` and `Content-Length`,
/// which the client recomputes for the outbound call
fn outbound_headers(headers: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || *name == header::HOST || *name == header::CONTENT_LENGTH {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}

/// Backend headers minus hop-by-hop ones; the body is buffered so the
/// length is recomputed as well
fn relayed_headers(headers: &HeaderMap) -> HeaderMap {
    let mut relayed = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || *name == header::CONTENT_LENGTH {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }
    relayed
}

fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
