//! AdmissionReview wire codec.
//!
//! Transport checks (content type, empty body) run before decode and fail with
//! a raw HTTP 400. Decode failures are kept alongside whatever envelope type
//! metadata could still be read so the caller can answer with a well-formed
//! review. Encoding writes the response patch as a base64 string, the form the
//! API server expects for byte fields.

use axum::http::{HeaderMap, header::CONTENT_TYPE};
use base64::{Engine, engine::general_purpose::STANDARD};
use kube::core::admission::{
    AdmissionRequest, AdmissionReview, META_API_VERSION_V1, META_API_VERSION_V1BETA1, META_KIND,
};
use kube::core::{DynamicObject, TypeMeta};
use serde_json::Value;

use super::error::AdmissionError;

/// The only media type accepted for review bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A review body after decode.
///
/// `types` is always populated (falling back to `admission.k8s.io/v1`) so the
/// response envelope can echo it even when `request` is an error. `uid` is
/// whatever `request.uid` could be read, empty if none.
#[derive(Debug, Clone)]
pub struct InboundReview {
    pub types: TypeMeta,
    pub uid: String,
    pub request: Result<AdmissionRequest<DynamicObject>, AdmissionError>,
    /// Set when `request.object` was present but not a valid object; the
    /// request is then decoded without it.
    pub object_error: Option<AdmissionError>,
}

/// Reject anything not sent as `application/json`.
///
/// Parameters such as `charset` are ignored and the media type is compared
/// case-insensitively.
pub fn check_content_type(headers: &HeaderMap) -> Result<(), AdmissionError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let media_type = content_type.split(';').next().unwrap_or_default().trim();

    if media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        Ok(())
    } else {
        Err(AdmissionError::ContentType(content_type.to_string()))
    }
}

pub fn check_body(body: &[u8]) -> Result<(), AdmissionError> {
    if body.is_empty() {
        return Err(AdmissionError::EmptyBody);
    }
    Ok(())
}

fn default_types() -> TypeMeta {
    TypeMeta {
        api_version: META_API_VERSION_V1.to_string(),
        kind: META_KIND.to_string(),
    }
}

/// Read `apiVersion`/`kind` from a body that failed full decode
fn peek_types(body: &Value) -> TypeMeta {
    serde_json::from_value::<TypeMeta>(body.clone())
        .ok()
        .filter(|types| !types.api_version.is_empty() && !types.kind.is_empty())
        .unwrap_or_else(default_types)
}

fn peek_uid(body: &Value) -> String {
    body.pointer("/request/uid")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn check_version(types: &TypeMeta) -> Result<(), AdmissionError> {
    let supported = [META_API_VERSION_V1, META_API_VERSION_V1BETA1];
    if types.kind != META_KIND || !supported.contains(&types.api_version.as_str()) {
        return Err(AdmissionError::Decode(format!(
            "unsupported review type {}/{}, expected {} or {}",
            types.api_version, types.kind, META_API_VERSION_V1, META_API_VERSION_V1BETA1
        )));
    }
    Ok(())
}

fn from_review(
    review: AdmissionReview<DynamicObject>,
    object_error: Option<AdmissionError>,
) -> InboundReview {
    let types = review.types.clone();
    let uid = review
        .request
        .as_ref()
        .map(|request| request.uid.clone())
        .unwrap_or_default();
    let request = check_version(&types).and_then(|()| {
        review
            .try_into()
            .map_err(|e: kube::core::admission::ConvertAdmissionReviewError| {
                AdmissionError::Decode(e.to_string())
            })
    });

    InboundReview {
        types,
        uid,
        request,
        object_error,
    }
}

/// Drop `request.object`/`request.oldObject` when they are not valid objects.
///
/// Returns the error of `object`, if it was dropped.
fn strip_invalid_objects(body: &mut Value) -> Option<AdmissionError> {
    let request = body.get_mut("request")?.as_object_mut()?;
    let mut object_error = None;

    for field in ["object", "oldObject"] {
        let invalid = match request.get(field) {
            Some(Value::Null) | None => None,
            Some(object) => serde_json::from_value::<DynamicObject>(object.clone()).err(),
        };
        if let Some(e) = invalid {
            request.remove(field);
            if field == "object" {
                object_error = Some(AdmissionError::DeserializeTarget(e.to_string()));
            }
        }
    }

    object_error
}

/// Decode a review body.
///
/// The body must be an `AdmissionReview` of a supported admission API version
/// and must carry a request. A target object that does not parse does not
/// fail the review: it is dropped and reported through `object_error`.
pub fn decode(body: &[u8]) -> InboundReview {
    let error = match serde_json::from_slice::<AdmissionReview<DynamicObject>>(body) {
        Ok(review) => return from_review(review, None),
        Err(e) => AdmissionError::Decode(e.to_string()),
    };

    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return InboundReview {
            types: default_types(),
            uid: String::new(),
            request: Err(error),
            object_error: None,
        };
    };

    let object_error = strip_invalid_objects(&mut value);
    let types = peek_types(&value);
    let uid = peek_uid(&value);
    match serde_json::from_value::<AdmissionReview<DynamicObject>>(value) {
        Ok(review) => from_review(review, object_error),
        Err(_) => InboundReview {
            types,
            uid,
            request: Err(error),
            object_error: None,
        },
    }
}

/// Rewrite a patch serialized as a byte array into its base64 form
fn base64_patch(patch: &mut Value) {
    let Value::Array(items) = patch else {
        return;
    };
    let bytes: Option<Vec<u8>> = items
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect();
    if let Some(bytes) = bytes {
        *patch = Value::String(STANDARD.encode(bytes));
    }
}

/// Serialize a response envelope
pub fn encode(review: &AdmissionReview<DynamicObject>) -> Result<Vec<u8>, AdmissionError> {
    let mut value =
        serde_json::to_value(review).map_err(|e| AdmissionError::Encode(e.to_string()))?;
    if let Some(patch) = value.pointer_mut("/response/patch") {
        base64_patch(patch);
    }
    serde_json::to_vec(&value).map_err(|e| AdmissionError::Encode(e.to_string()))
}
