//! Admission webhook server.
//!
//! Serves `/validate` and `/mutate` over TLS. The certificate, private key and
//! the Validating/MutatingWebhookConfiguration objects are provisioned outside
//! this process; the key pair is expected at /etc/webhook/certs/ by default.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_server::tls_rustls::RustlsConfig;
use kube::core::DynamicObject;
use kube::core::admission::AdmissionReview;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::codec::{self, JSON_CONTENT_TYPE};
use super::dispatch::{self, Endpoint, MUTATE_PATH, VALIDATE_PATH};
use crate::config::WhitelistConfig;
use crate::health::HealthState;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub whitelist: Arc<WhitelistConfig>,
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(whitelist: Arc<WhitelistConfig>, health: Arc<HealthState>) -> Self {
        Self { whitelist, health }
    }
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS key pair could not be loaded
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Create the webhook router.
///
/// Paths other than `/validate` and `/mutate` still reach the admission
/// handler so they are answered with an explicit denial.
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_PATH, post(admission_handler))
        .route(MUTATE_PATH, post(admission_handler))
        .fallback(admission_handler)
        .with_state(state)
}

/// Metric label for the decision carried by a review
fn decision_label(review: &AdmissionReview<DynamicObject>) -> &'static str {
    match &review.response {
        Some(response) if response.allowed && response.patch.is_some() => "patched",
        Some(response) if response.allowed => "allowed",
        _ => "denied",
    }
}

/// Handle one admission review: check transport, decode, dispatch, encode
async fn admission_handler(
    State(state): State<Arc<WebhookState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let path = uri.path();
    let endpoint = Endpoint::from_path(path);
    let metrics = &state.health.metrics;

    if let Err(e) = codec::check_content_type(&headers).and_then(|()| codec::check_body(&body)) {
        error!(endpoint = endpoint.as_str(), error = %e, "Rejecting admission request");
        metrics.record_review(endpoint.as_str(), "rejected", started.elapsed().as_secs_f64());
        return e.into_response();
    }

    let inbound = codec::decode(&body);
    if let Err(e) = &inbound.request {
        error!(endpoint = endpoint.as_str(), uid = %inbound.uid, error = %e, "Can not decode body");
    }
    if let Some(e) = &inbound.object_error {
        warn!(endpoint = endpoint.as_str(), uid = %inbound.uid, error = %e, "Can not decode target object");
    }

    let review = dispatch::dispatch(path, &inbound, &state.whitelist);
    let decision = decision_label(&review);
    if let (Ok(request), "patched") = (&inbound.request, decision) {
        metrics.record_patch(&request.kind.kind);
    }

    debug!(
        endpoint = endpoint.as_str(),
        decision,
        response = ?review.response,
        "Sending admission response"
    );

    let response = match codec::encode(&review) {
        Ok(bytes) => (StatusCode::OK, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response(),
        Err(e) => {
            error!(endpoint = endpoint.as_str(), error = %e, "Can not encode response");
            metrics.record_review(endpoint.as_str(), "rejected", started.elapsed().as_secs_f64());
            return e.into_response();
        }
    };

    metrics.record_review(endpoint.as_str(), decision, started.elapsed().as_secs_f64());
    response
}

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0:`port` and serves `/validate` and `/mutate`. Readiness
/// is reported once the key pair has been loaded.
///
/// # Arguments
/// * `state` - Shared whitelist and health state
/// * `port` - Listen port
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    port: u16,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), WebhookError> {
    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let health = state.health.clone();
    let app = create_webhook_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Webhook server listening with TLS");
    health.set_ready(true).await;

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
