//! Admission webhooks.
//!
//! - `/validate`: pod images must come from a whitelisted registry
//! - `/mutate`: Deployments and Services get an idempotent status annotation
//!
//! A review flows through the codec (decode), the dispatcher (route + policy +
//! envelope assembly) and back through the codec (encode).

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod patch;
pub mod policies;
mod server;

pub use dispatch::{Endpoint, MUTATE_PATH, VALIDATE_PATH};
pub use error::AdmissionError;
pub use patch::{PatchOp, PatchOperation, PatchValue};
pub use policies::annotations::{ANNOTATION_MUTATE_KEY, ANNOTATION_STATUS_KEY, TargetKind};
pub use server::{WebhookError, WebhookState, create_webhook_router, run_webhook_server};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
