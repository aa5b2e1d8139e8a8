//! Request routing and response assembly.
//!
//! The dispatcher picks the policy for an endpoint path and wraps whatever it
//! decides in a response envelope that echoes the request's type metadata and
//! uid.

use kube::core::admission::{AdmissionResponse, AdmissionReview};
use kube::core::{DynamicObject, TypeMeta};

use super::codec::InboundReview;
use super::error::AdmissionError;
use super::policies::annotations::{self, TargetKind};
use super::policies::registry;
use crate::config::WhitelistConfig;

/// Path of the validating webhook
pub const VALIDATE_PATH: &str = "/validate";
/// Path of the mutating webhook
pub const MUTATE_PATH: &str = "/mutate";

/// Webhook endpoints served by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Validate,
    Mutate,
    Unknown,
}

impl Endpoint {
    pub fn from_path(path: &str) -> Self {
        match path {
            VALIDATE_PATH => Endpoint::Validate,
            MUTATE_PATH => Endpoint::Mutate,
            _ => Endpoint::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Validate => "validate",
            Endpoint::Mutate => "mutate",
            Endpoint::Unknown => "unknown",
        }
    }
}

/// Route a decoded review to its policy and assemble the response envelope.
///
/// Decode failures are answered with code 500 without consulting any policy.
/// Unknown paths are denied with code 404. A target object that did not parse
/// is reported with code 400 once the endpoint would have to read it.
pub fn dispatch(
    path: &str,
    inbound: &InboundReview,
    whitelist: &WhitelistConfig,
) -> AdmissionReview<DynamicObject> {
    let request = match &inbound.request {
        Ok(request) => request,
        Err(e) => {
            let response = e.deny(AdmissionResponse::invalid(e));
            return assemble(&inbound.types, &inbound.uid, response);
        }
    };

    let object_error = inbound.object_error.as_ref();
    let response = match Endpoint::from_path(path) {
        Endpoint::Validate => match object_error {
            Some(e) => e.deny(AdmissionResponse::from(request)),
            None => registry::validate(request, whitelist),
        },
        Endpoint::Mutate => match (object_error, TargetKind::from_kind(&request.kind.kind)) {
            (Some(e), TargetKind::Deployment | TargetKind::Service) => {
                e.deny(AdmissionResponse::from(request))
            }
            _ => annotations::mutate(request),
        },
        Endpoint::Unknown => AdmissionError::UnknownEndpoint(path.to_string())
            .deny(AdmissionResponse::from(request)),
    };

    assemble(&inbound.types, &request.uid, response)
}

/// Wrap `response` in an envelope echoing `types` and correlated by `uid`
pub fn assemble(
    types: &TypeMeta,
    uid: &str,
    mut response: AdmissionResponse,
) -> AdmissionReview<DynamicObject> {
    response.uid = uid.to_string();
    response.types = types.clone();

    AdmissionReview {
        types: types.clone(),
        request: None,
        response: Some(response),
    }
}
