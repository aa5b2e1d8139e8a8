//! admission-registry library crate
//!
//! Decision core of a Kubernetes admission webhook: a validating registry
//! whitelist for Pods and an annotation-stamping mutation for Deployments and
//! Services, plus the health/metrics server that runs next to it.

pub mod config;
pub mod health;
pub mod webhooks;

pub use config::{Config, WhitelistConfig};
pub use health::HealthState;
pub use webhooks::{
    AdmissionError, WebhookError, WebhookState, create_webhook_router, run_webhook_server,
};
