//! Admission policies.
//!
//! - `registry` (validating): pod images must come from a whitelisted registry
//! - `annotations` (mutating): Deployments and Services are stamped with a
//!   status annotation unless they opt out or already carry it
//!
//! Policies are pure: they read the request and the immutable whitelist and
//! return a response without touching anything else.

pub mod annotations;
pub mod registry;

use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use serde::de::DeserializeOwned;

use super::error::AdmissionError;

/// Deserialize the request's target object into a concrete Kubernetes type
pub fn decode_object<K: DeserializeOwned>(
    request: &AdmissionRequest<DynamicObject>,
) -> Result<K, AdmissionError> {
    let object = request
        .object
        .as_ref()
        .ok_or_else(|| AdmissionError::DeserializeTarget("request carries no object".into()))?;
    let value =
        serde_json::to_value(object).map_err(|e| AdmissionError::DeserializeTarget(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| AdmissionError::DeserializeTarget(e.to_string()))
}
