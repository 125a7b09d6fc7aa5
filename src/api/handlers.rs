//! Request handlers for the management and proxy endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, Uri},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backend::forwarder::ForwardedResponse;
use crate::error::{AppError, Result};
use crate::gateway::router::RoutedRequest;
use crate::registry::models::{Instance, Registry};
use crate::AppState;

/// Body of `POST /register` and `POST /unregister`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub api_name: String,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub weight: Option<u32>,
}

impl RegistrationRequest {
    fn validate(&self) -> Result<()> {
        if !matches!(self.protocol.as_str(), "http" | "https") {
            return Err(AppError::InvalidRequest(format!(
                "Unsupported protocol '{}', expected 'http' or 'https'",
                self.protocol
            )));
        }
        if self.host.trim().is_empty() {
            return Err(AppError::InvalidRequest("host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(AppError::InvalidRequest("port cannot be 0".to_string()));
        }
        Ok(())
    }

    fn url(&self) -> String {
        Instance::derive_url(&self.protocol, &self.host, self.port)
    }

    fn into_instance(self) -> Instance {
        let instance = Instance::new(self.protocol, self.host, self.port);
        match self.weight {
            Some(weight) => instance.with_weight(weight),
            None => instance,
        }
    }
}

/// Body of `POST /enable/:apiName`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnableRequest {
    pub url: String,
    pub enabled: bool,
}

/// Confirmation returned by management endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    fn ok(message: String) -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
            message,
        })
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        services: state.registry.services().services.len(),
    })
}

pub async fn list_services(State(state): State<Arc<AppState>>) -> Json<Registry> {
    Json(state.registry.services())
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<StatusResponse>> {
    request.validate()?;
    let service = request.api_name.clone();

    state
        .registry
        .register(&service, request.into_instance())
        .await?;

    Ok(StatusResponse::ok(format!("successfully registered {}", service)))
}

pub async fn unregister(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<StatusResponse>> {
    request.validate()?;

    state
        .registry
        .unregister(&request.api_name, &request.url())
        .await?;

    Ok(StatusResponse::ok(format!(
        "successfully unregistered {}",
        request.api_name
    )))
}

pub async fn set_enabled(
    State(state): State<Arc<AppState>>,
    Path(api_name): Path<String>,
    Json(request): Json<EnableRequest>,
) -> Result<Json<StatusResponse>> {
    state
        .registry
        .set_enabled(&api_name, &request.url, request.enabled)
        .await?;

    let action = if request.enabled { "enabled" } else { "disabled" };
    Ok(StatusResponse::ok(format!(
        "successfully {} {} for service {}",
        action, request.url, api_name
    )))
}

/// `ANY /:apiName`
pub async fn proxy_root(
    State(state): State<Arc<AppState>>,
    Path(api_name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ForwardedResponse> {
    forward(&state, &api_name, "", method, &uri, &headers, body).await
}

/// `ANY /:apiName/*path`
///
/// The captured `path` is percent-decoded by the extractor, so the raw one is
/// taken from the request URI instead.
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    Path((api_name, _)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ForwardedResponse> {
    let path = downstream_path(&uri);
    forward(&state, &api_name, path, method, &uri, &headers, body).await
}

/// Everything after the first path segment, still percent-encoded
fn downstream_path(uri: &Uri) -> &str {
    let rest = uri.path().trim_start_matches('/');
    match rest.find('/') {
        Some(index) => &rest[index + 1..],
        None => "",
    }
}

async fn forward(
    state: &AppState,
    service: &str,
    path: &str,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ForwardedResponse> {
    state
        .gateway
        .route(RoutedRequest {
            service,
            path,
            method,
            query: uri.query(),
            headers,
            body,
        })
        .await
}
