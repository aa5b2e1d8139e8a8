//! Image registry whitelist policy.
//!
//! Validating: applied to Pods on CREATE/UPDATE.
//!
//! Every container image must start with one of the whitelisted registry
//! prefixes. Containers are checked in declaration order and the first
//! offender is reported.

use k8s_openapi::api::core::v1::Pod;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, info, warn};

use super::decode_object;
use crate::config::WhitelistConfig;
use crate::webhooks::error::AdmissionError;

/// Check every container image of `pod` against the whitelist
pub fn check_images(pod: &Pod, whitelist: &WhitelistConfig) -> Result<(), AdmissionError> {
    let containers = pod.spec.iter().flat_map(|spec| spec.containers.iter());

    for container in containers {
        let image = container.image.as_deref().unwrap_or_default();
        if !whitelist.permits(image) {
            return Err(AdmissionError::PolicyViolation {
                image: image.to_string(),
                whitelist: whitelist.registries().to_vec(),
            });
        }
        debug!(container = %container.name, image = %image, "Image registry whitelisted");
    }

    Ok(())
}

/// Validate a Pod admission request
pub fn validate(
    request: &AdmissionRequest<DynamicObject>,
    whitelist: &WhitelistConfig,
) -> AdmissionResponse {
    let uid = &request.uid;
    info!(
        uid = %uid,
        kind = %request.kind.kind,
        namespace = ?request.namespace,
        name = %request.name,
        "Validating pod images"
    );

    let pod: Pod = match decode_object(request) {
        Ok(pod) => pod,
        Err(e) => {
            warn!(uid = %uid, error = %e, "Can not decode pod");
            return e.deny(AdmissionResponse::from(request));
        }
    };

    match check_images(&pod, whitelist) {
        Ok(()) => {
            let mut response = AdmissionResponse::from(request);
            response.result.code = 200;
            response
        }
        Err(e) => {
            warn!(uid = %uid, error = %e, "Admission request denied");
            e.deny(AdmissionResponse::from(request))
        }
    }
}
