//! Annotation mutation policy.
//!
//! Mutating: applied to Deployments and Services.
//!
//! Objects are stamped with `io.ydzs.admission-registry/status: mutated`.
//! An object opts out with `io.ydzs.admission-registry/mutate` set to
//! `n`, `no`, `false` or `off`. The status annotation is the only record of a
//! previous mutation, so an object already marked `mutated` is never patched
//! again.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, info, warn};

use super::decode_object;
use crate::webhooks::error::AdmissionError;
use crate::webhooks::patch::{mutate_annotations, to_json_patch};

/// Opt-out control annotation
pub const ANNOTATION_MUTATE_KEY: &str = "io.ydzs.admission-registry/mutate";
/// Idempotency status annotation
pub const ANNOTATION_STATUS_KEY: &str = "io.ydzs.admission-registry/status";
/// Status value written by this policy
pub const STATUS_MUTATED: &str = "mutated";

const OPT_OUT_VALUES: [&str; 4] = ["n", "no", "false", "off"];

/// Kinds the mutating webhook may receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    Deployment,
    Service,
    Unsupported(String),
}

impl TargetKind {
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "Deployment" => TargetKind::Deployment,
            "Service" => TargetKind::Service,
            other => TargetKind::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Deployment => write!(f, "Deployment"),
            TargetKind::Service => write!(f, "Service"),
            TargetKind::Unsupported(kind) => write!(f, "{}", kind),
        }
    }
}

/// Decide whether an object with these annotations still needs mutating
pub fn mutation_required(annotations: Option<&BTreeMap<String, String>>) -> bool {
    let lookup = |key: &str| {
        annotations
            .and_then(|a| a.get(key))
            .map(|v| v.to_lowercase())
            .unwrap_or_default()
    };

    let opted_out = OPT_OUT_VALUES.contains(&lookup(ANNOTATION_MUTATE_KEY).as_str());
    let already_mutated = lookup(ANNOTATION_STATUS_KEY) == STATUS_MUTATED;

    !opted_out && !already_mutated
}

/// Annotations this policy writes
pub fn desired_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(
        ANNOTATION_STATUS_KEY.to_string(),
        STATUS_MUTATED.to_string(),
    )])
}

fn target_metadata(
    kind: &TargetKind,
    request: &AdmissionRequest<DynamicObject>,
) -> Result<ObjectMeta, AdmissionError> {
    match kind {
        TargetKind::Deployment => decode_object::<Deployment>(request).map(|d| d.metadata),
        TargetKind::Service => decode_object::<Service>(request).map(|s| s.metadata),
        TargetKind::Unsupported(kind) => Err(AdmissionError::UnsupportedKind(kind.clone())),
    }
}

/// Mutate a Deployment or Service admission request
pub fn mutate(request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let uid = &request.uid;
    let kind = TargetKind::from_kind(&request.kind.kind);
    info!(
        uid = %uid,
        kind = %kind,
        namespace = ?request.namespace,
        name = %request.name,
        "Mutating object annotations"
    );

    let metadata = match target_metadata(&kind, request) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(uid = %uid, error = %e, "Can not mutate object");
            return e.deny(AdmissionResponse::from(request));
        }
    };

    let annotations = metadata.annotations.as_ref();
    let required = mutation_required(annotations);
    debug!(
        uid = %uid,
        name = ?metadata.name,
        namespace = ?metadata.namespace,
        required,
        "Mutation policy evaluated"
    );
    if !required {
        return AdmissionResponse::from(request);
    }

    let operations = mutate_annotations(annotations, &desired_annotations());
    match AdmissionResponse::from(request).with_patch(to_json_patch(operations)) {
        Ok(response) => {
            info!(uid = %uid, kind = %kind, "Patched object annotations");
            response
        }
        Err(e) => {
            warn!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionError::PatchMarshal(e.to_string()).deny(AdmissionResponse::from(request))
        }
    }
}
