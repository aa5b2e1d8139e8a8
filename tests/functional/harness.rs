//! Router harness shared by the functional tests.

use std::sync::Arc;

use admission_registry::webhooks::create_webhook_router;
use admission_registry::{HealthState, WebhookState, WhitelistConfig};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use tower::ServiceExt;

/// Whitelist used by most scenarios
pub const INTERNAL_REGISTRY: &str = "internal.registry";

/// A router plus the health state it reports metrics into
pub struct Harness {
    pub router: Router,
    pub health: Arc<HealthState>,
}

impl Harness {
    pub fn new(registries: &[&str]) -> Self {
        let health = Arc::new(HealthState::new());
        let state = Arc::new(WebhookState::new(
            Arc::new(WhitelistConfig::new(registries.iter().copied())),
            health.clone(),
        ));
        Self {
            router: create_webhook_router(state),
            health,
        }
    }

    /// Send a raw request and return status and body
    pub async fn send(
        &self,
        path: &str,
        content_type: Option<&str>,
        body: impl Into<Body>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method("POST").uri(path);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let request = builder.body(body.into()).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    /// Send a JSON review, expect HTTP 200 and return the decoded envelope
    pub async fn review(&self, path: &str, body: String) -> Value {
        let (status, body) = self.send(path, Some("application/json"), body).await;
        assert_eq!(status, StatusCode::OK, "body: {}", String::from_utf8_lossy(&body));
        serde_json::from_slice(&body).unwrap()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(&[INTERNAL_REGISTRY])
    }
}

/// Decode the base64 JSON Patch carried by a response envelope
pub fn decoded_patch(review: &Value) -> Option<Value> {
    let encoded = review["response"]["patch"].as_str()?;
    let bytes = STANDARD.decode(encoded).unwrap();
    Some(serde_json::from_slice(&bytes).unwrap())
}
