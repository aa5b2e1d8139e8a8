//! End-to-end validate/mutate decisions.

use admission_registry::webhooks::{ANNOTATION_MUTATE_KEY, ANNOTATION_STATUS_KEY};
use serde_json::json;

use crate::common::fixtures::{ObjectBuilder, ReviewBuilder};
use crate::harness::{Harness, decoded_patch};

// ============================================================================
// Validating webhook
// ============================================================================

/// Scenario A: one untrusted image denies the pod and is named in the message.
#[tokio::test]
async fn test_scenario_a_untrusted_registry_denied() {
    let harness = Harness::default();
    let body = ReviewBuilder::pod(&["docker.io/app", "internal.registry/base"]).body();

    let review = harness.review("/validate", body).await;
    let response = &review["response"];

    assert_eq!(response["allowed"], false);
    assert_eq!(response["status"]["code"], 403);
    let message = response["status"]["message"].as_str().unwrap();
    assert!(message.contains("docker.io/app"));
    assert!(message.contains("internal.registry"));
    assert!(response.get("patch").is_none());
}

/// Scenario B: every image from the whitelisted registry is allowed.
#[tokio::test]
async fn test_scenario_b_trusted_registry_allowed() {
    let harness = Harness::default();
    let body = ReviewBuilder::pod(&["internal.registry/app:1.2", "internal.registry/sidecar"]).body();

    let review = harness.review("/validate", body).await;
    let response = &review["response"];

    assert_eq!(response["allowed"], true);
    assert_eq!(response["status"]["code"], 200);
    assert!(response["status"]["message"].as_str().unwrap_or_default().is_empty());
}

/// The reported image is the first offender in declaration order.
#[tokio::test]
async fn test_first_offender_in_declaration_order() {
    let harness = Harness::default();
    let body = ReviewBuilder::pod(&["internal.registry/base", "quay.io/b", "docker.io/a"]).body();

    let review = harness.review("/validate", body).await;
    let message = review["response"]["status"]["message"].as_str().unwrap();
    assert!(message.starts_with("quay.io/b"));
    assert!(!message.contains("docker.io/a"));
}

/// A non-Pod object on /validate fails to deserialize and is rejected with 400.
#[tokio::test]
async fn test_validate_rejects_non_pod_object() {
    let harness = Harness::default();
    let body = ReviewBuilder::new("Pod")
        .object(ObjectBuilder::deployment("web").build())
        .body();

    let review = harness.review("/validate", body).await;
    assert_eq!(review["response"]["allowed"], false);
    assert_eq!(review["response"]["status"]["code"], 400);
}

/// A review without an object cannot be validated.
#[tokio::test]
async fn test_validate_without_object() {
    let harness = Harness::default();
    let review = harness
        .review("/validate", ReviewBuilder::new("Pod").body())
        .await;

    assert_eq!(review["response"]["allowed"], false);
    assert_eq!(review["response"]["status"]["code"], 400);
}

// ============================================================================
// Mutating webhook
// ============================================================================

/// Scenario C: a fresh Deployment gets one add op creating the annotations.
#[tokio::test]
async fn test_scenario_c_deployment_mutated() {
    let harness = Harness::default();
    let body = ReviewBuilder::deployment(ObjectBuilder::deployment("web").build()).body();

    let review = harness.review("/mutate", body).await;
    let response = &review["response"];

    assert_eq!(response["allowed"], true);
    assert_eq!(response["patchType"], "JSONPatch");
    assert_eq!(
        decoded_patch(&review).unwrap(),
        json!([{
            "op": "add",
            "path": "/metadata/annotations",
            "value": { ANNOTATION_STATUS_KEY: "mutated" }
        }])
    );
}

/// Scenario D: an already mutated Deployment is allowed without a patch.
#[tokio::test]
async fn test_scenario_d_already_mutated() {
    let harness = Harness::default();
    let object = ObjectBuilder::deployment("web")
        .annotation(ANNOTATION_STATUS_KEY, "mutated")
        .build();

    let review = harness
        .review("/mutate", ReviewBuilder::deployment(object).body())
        .await;
    let response = &review["response"];

    assert_eq!(response["allowed"], true);
    assert!(response.get("patch").is_none());
    assert!(response.get("patchType").is_none());
}

/// Scenario E: ConfigMaps are not a supported mutation target.
#[tokio::test]
async fn test_scenario_e_unsupported_kind() {
    let harness = Harness::default();
    let object = ObjectBuilder::new("v1", "ConfigMap", "settings").build();

    let review = harness
        .review("/mutate", ReviewBuilder::new("ConfigMap").object(object).body())
        .await;
    let response = &review["response"];

    assert_eq!(response["allowed"], false);
    assert_eq!(response["status"]["code"], 400);
    assert!(response["status"]["message"].as_str().unwrap().contains("ConfigMap"));
}

/// Services are mutated the same way as Deployments.
#[tokio::test]
async fn test_service_mutated() {
    let harness = Harness::default();
    let body = ReviewBuilder::service(ObjectBuilder::service("api").build()).body();

    let review = harness.review("/mutate", body).await;
    assert_eq!(review["response"]["allowed"], true);
    assert!(decoded_patch(&review).is_some());
}

/// Opting out skips the patch.
#[tokio::test]
async fn test_opt_out_skips_patch() {
    let harness = Harness::default();
    let object = ObjectBuilder::service("api")
        .annotation(ANNOTATION_MUTATE_KEY, "Off")
        .build();

    let review = harness
        .review("/mutate", ReviewBuilder::service(object).body())
        .await;
    assert_eq!(review["response"]["allowed"], true);
    assert!(decoded_patch(&review).is_none());
}

/// Existing annotations survive the add operation.
#[tokio::test]
async fn test_existing_annotations_preserved() {
    let harness = Harness::default();
    let object = ObjectBuilder::deployment("web")
        .annotation(ANNOTATION_MUTATE_KEY, "yes")
        .annotation("team", "payments")
        .build();

    let review = harness
        .review("/mutate", ReviewBuilder::deployment(object.clone()).body())
        .await;
    let patch: json_patch::Patch = serde_json::from_value(decoded_patch(&review).unwrap()).unwrap();

    let mut patched = object;
    json_patch::patch(&mut patched, &patch.0).unwrap();
    let annotations = &patched["metadata"]["annotations"];
    assert_eq!(annotations[ANNOTATION_STATUS_KEY], "mutated");
    assert_eq!(annotations[ANNOTATION_MUTATE_KEY], "yes");
    assert_eq!(annotations["team"], "payments");
}

/// A stale status value is replaced with the new one, not the key name.
#[tokio::test]
async fn test_stale_status_replaced() {
    let harness = Harness::default();
    let object = ObjectBuilder::deployment("web")
        .annotation(ANNOTATION_STATUS_KEY, "pending")
        .build();

    let review = harness
        .review("/mutate", ReviewBuilder::deployment(object).body())
        .await;
    assert_eq!(
        decoded_patch(&review).unwrap(),
        json!([{
            "op": "replace",
            "path": "/metadata/annotations/io.ydzs.admission-registry~1status",
            "value": "mutated"
        }])
    );
}

/// A Deployment body that is not a valid Deployment is rejected with 400.
#[tokio::test]
async fn test_mutate_rejects_malformed_deployment() {
    let harness = Harness::default();
    let object = ObjectBuilder::deployment("web").spec(json!({"replicas": "many"})).build();

    let review = harness
        .review("/mutate", ReviewBuilder::deployment(object).body())
        .await;
    assert_eq!(review["response"]["allowed"], false);
    assert_eq!(review["response"]["status"]["code"], 400);
}

/// Malformed metadata fails the target object only: 400 with the uid echoed.
#[tokio::test]
async fn test_mutate_malformed_annotations_keeps_uid() {
    let harness = Harness::default();
    let mut object = ObjectBuilder::deployment("web").build();
    object["metadata"]["annotations"] = json!({"team": 5});
    let body = ReviewBuilder::deployment(object)
        .uid("b7e1c0de-0000-4000-8000-000000000005")
        .body();

    let review = harness.review("/mutate", body).await;
    let response = &review["response"];

    assert_eq!(response["uid"], "b7e1c0de-0000-4000-8000-000000000005");
    assert_eq!(response["allowed"], false);
    assert_eq!(response["status"]["code"], 400);
    assert!(response.get("patch").is_none());
}

/// Same for a pod on the validating side.
#[tokio::test]
async fn test_validate_malformed_labels_keeps_uid() {
    let harness = Harness::default();
    let mut object = ObjectBuilder::pod("web", &["internal.registry/a"]).build();
    object["metadata"]["labels"] = json!({"tier": true});
    let body = ReviewBuilder::new("Pod").object(object).uid("uid-labels").body();

    let review = harness.review("/validate", body).await;
    assert_eq!(review["response"]["uid"], "uid-labels");
    assert_eq!(review["response"]["status"]["code"], 400);
}

/// Answered reviews are counted per endpoint and decision.
#[tokio::test]
async fn test_metrics_recorded() {
    let harness = Harness::default();
    harness
        .review("/validate", ReviewBuilder::pod(&["docker.io/app"]).body())
        .await;
    harness
        .review(
            "/mutate",
            ReviewBuilder::deployment(ObjectBuilder::deployment("web").build()).body(),
        )
        .await;

    let encoded = harness.health.metrics.encode();
    assert!(encoded.contains("endpoint=\"validate\",decision=\"denied\""));
    assert!(encoded.contains("endpoint=\"mutate\",decision=\"patched\""));
    assert!(encoded.contains("kind=\"Deployment\""));
}
