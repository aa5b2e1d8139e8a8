//! Error taxonomy for admission reviews.
//!
//! Every failure a single review can hit is a variant of [`AdmissionError`].
//! Most are answered inside a well-formed AdmissionReview; the few that happen
//! before decode (or while encoding) short-circuit with a raw HTTP body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kube::core::admission::AdmissionResponse;
use thiserror::Error;

/// Errors that terminate processing of one admission review
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// Request was not sent as `application/json`
    #[error("Content-Type invalid, expect application/json but got {0:?}")]
    ContentType(String),

    /// Request body was empty
    #[error("empty data body")]
    EmptyBody,

    /// Body is not a supported AdmissionReview
    #[error("{0}")]
    Decode(String),

    /// Target object does not match the schema of its kind
    #[error("{0}")]
    DeserializeTarget(String),

    /// Mutation requested for a kind that has no mutation policy
    #[error("Can not handle the kind({0}) object: only Deployment and Service are mutated")]
    UnsupportedKind(String),

    /// Container image is outside the registry whitelist
    #[error("{image} image comes from an untrusted registry! Only images from {whitelist:?} are allowed")]
    PolicyViolation {
        image: String,
        whitelist: Vec<String>,
    },

    /// Patch could not be serialized
    #[error("{0}")]
    PatchMarshal(String),

    /// No admission policy is mounted at the requested path
    #[error("no admission policy is served at {0}")]
    UnknownEndpoint(String),

    /// Response envelope could not be serialized
    #[error("Can not encode response: {0}")]
    Encode(String),
}

impl AdmissionError {
    /// Status code reported to the caller, as the HTTP status for raw errors
    /// and as `status.code` inside the envelope otherwise.
    pub fn code(&self) -> u16 {
        match self {
            AdmissionError::ContentType(_)
            | AdmissionError::EmptyBody
            | AdmissionError::Encode(_)
            | AdmissionError::DeserializeTarget(_)
            | AdmissionError::UnsupportedKind(_)
            | AdmissionError::PatchMarshal(_) => 400,
            AdmissionError::PolicyViolation { .. } => 403,
            AdmissionError::UnknownEndpoint(_) => 404,
            AdmissionError::Decode(_) => 500,
        }
    }

    /// Short machine-readable reason, written to `status.reason`
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::ContentType(_) => "UnsupportedMediaType",
            AdmissionError::EmptyBody => "EmptyBody",
            AdmissionError::Decode(_) => "InvalidReview",
            AdmissionError::DeserializeTarget(_) => "InvalidObject",
            AdmissionError::UnsupportedKind(_) => "UnsupportedKind",
            AdmissionError::PolicyViolation { .. } => "UntrustedRegistry",
            AdmissionError::PatchMarshal(_) => "PatchFailed",
            AdmissionError::UnknownEndpoint(_) => "UnknownEndpoint",
            AdmissionError::Encode(_) => "EncodeFailed",
        }
    }

    /// Whether this error is answered with a raw HTTP body instead of an AdmissionReview
    pub fn is_raw(&self) -> bool {
        matches!(
            self,
            AdmissionError::ContentType(_) | AdmissionError::EmptyBody | AdmissionError::Encode(_)
        )
    }

    /// Turn `base` into a denial carrying this error's code, reason and message.
    ///
    /// `base` should come from `AdmissionResponse::from(&request)` so the uid
    /// is already correlated, or from `AdmissionResponse::invalid` when no
    /// request could be read.
    pub fn deny(&self, base: AdmissionResponse) -> AdmissionResponse {
        let mut response = base.deny(self.to_string());
        response.result.code = self.code();
        response.result.reason = self.reason().to_string();
        response
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code()).unwrap_or(StatusCode::BAD_REQUEST);
        (status, self.to_string()).into_response()
    }
}
