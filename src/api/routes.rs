//! API Routes
//!
//! The webhook entry point and a health check.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::backend::WebhookRequest;
use crate::error::AppResult;
use crate::relay::{RelayOutcome, WebhookRelay};

/// Shared state for handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: WebhookRelay,
}

impl AppState {
    pub fn new(relay: WebhookRelay) -> Self {
        Self { relay }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: String,
}

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/wallet/webhook", get(wallet_webhook).post(wallet_webhook))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Hand the call, untouched, to the backend's webhook handler
async fn wallet_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookResponse>> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let request = WebhookRequest {
        headers,
        body: body.to_vec(),
    };

    let status = match state.relay.relay(request).await? {
        RelayOutcome::Handled => "handled",
        RelayOutcome::NotSupported => "not_supported",
    };

    Ok(Json(WebhookResponse {
        status: status.to_string(),
    }))
}
