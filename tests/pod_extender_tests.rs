//! Integration tests for the Pod admission handler
//!
//! Admission reviews are fed through `server::review` with an in-memory
//! TailingSidecar source, and returned patches are applied to the original
//! Pod to check the outcome.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::AdmissionResponse;
use serde_json::json;
use tailing_sidecar_operator::metrics::SIDECAR_CONFIGS_SKIPPED;
use tailing_sidecar_operator::webhook::{server, InjectionSettings, PodExtender};

// ============================================================================
// Test Helpers
// ============================================================================

fn extender(source: FakeSource) -> Arc<PodExtender<FakeSource>> {
    let mut settings = InjectionSettings::new(IMAGE);
    settings.host_path_root = ROOT.to_string();
    settings.lookup_timeout = Duration::from_millis(100);
    PodExtender::new(source, settings)
}

fn review_body(object: serde_json::Value, operation: &str) -> Vec<u8> {
    let name = object["metadata"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    serde_json::to_vec(&json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "requestKind": {"group": "", "version": "v1", "kind": "Pod"},
            "requestResource": {"group": "", "version": "v1", "resource": "pods"},
            "name": name,
            "namespace": NAMESPACE,
            "operation": operation,
            "userInfo": {"username": "admin", "groups": ["system:masters"]},
            "object": object,
            "dryRun": false
        }
    }))
    .unwrap()
}

async fn admit(
    extender: &PodExtender<FakeSource>,
    pod: &Pod,
    operation: &str,
) -> AdmissionResponse {
    let body = review_body(serde_json::to_value(pod).unwrap(), operation);
    server::review(extender, &body)
        .await
        .expect("review should be readable")
        .response
        .expect("review should carry a response")
}

fn apply_patch(original: &Pod, response: &AdmissionResponse) -> Pod {
    let mut doc = serde_json::to_value(original).unwrap();
    if let Some(patch) = &response.patch {
        let patch: json_patch::Patch = serde_json::from_slice(patch).unwrap();
        json_patch::patch(&mut doc, &patch.0).unwrap();
    }
    serde_json::from_value(doc).unwrap()
}

fn app_resource() -> FakeSource {
    FakeSource::with(vec![tailing_sidecar(
        "app-logs",
        &[("app", "/var/log/app.log", "app-data")],
    )])
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[tokio::test]
async fn injects_sidecar_from_namespace_resource() {
    let extender = extender(app_resource());
    let pod = app_pod(Some(""));

    let response = admit(&extender, &pod, "CREATE").await;
    assert!(response.allowed);
    assert!(response.patch.is_some());

    let mutated = apply_patch(&pod, &response);
    assert_eq!(container_names(&mutated), vec!["app", "tailing-sidecar0"]);
    assert_eq!(volume_names(&mutated), vec!["app-data", "volume-sidecar0"]);
    assert_eq!(
        volumes(&mutated)[1].host_path.as_ref().unwrap().path,
        "/var/log/tailing-sidecar-fluentbit/default/app-pod/tailing-sidecar0"
    );
}

#[tokio::test]
async fn update_of_reconciled_pod_yields_no_patch() {
    let extender = extender(app_resource());
    let pod = app_pod(Some(""));

    let created = apply_patch(&pod, &admit(&extender, &pod, "CREATE").await);
    let response = admit(&extender, &created, "UPDATE").await;

    assert!(response.allowed);
    assert!(response.patch.is_none());
}

#[tokio::test]
async fn removes_sidecar_after_resource_is_deleted() {
    let pod = app_pod(Some(""));
    let created = apply_patch(&pod, &admit(&extender(app_resource()), &pod, "CREATE").await);

    let response = admit(&extender(FakeSource::default()), &created, "UPDATE").await;
    assert!(response.allowed);

    let updated = apply_patch(&created, &response);
    assert_eq!(container_names(&updated), vec!["app"]);
    assert_eq!(volume_names(&updated), vec!["app-data"]);
    assert_eq!(containers(&updated)[0], containers(&pod)[0]);
}

#[tokio::test]
async fn config_for_missing_volume_is_skipped() {
    let extender = extender(FakeSource::with(vec![tailing_sidecar(
        "broken",
        &[("missing", "/var/log/app.log", "missing-vol")],
    )]));
    let pod = app_pod(Some(""));
    let skipped_before = SIDECAR_CONFIGS_SKIPPED.get();

    let response = admit(&extender, &pod, "CREATE").await;
    assert!(response.allowed);
    assert!(response.patch.is_none());
    assert!(SIDECAR_CONFIGS_SKIPPED.get() >= skipped_before + 1.0);
}

#[tokio::test]
async fn pod_without_annotation_passes_unchanged() {
    let extender = extender(app_resource());
    let pod = app_pod(None);

    let response = admit(&extender, &pod, "CREATE").await;
    assert!(response.allowed);
    assert!(response.patch.is_none());
}

// ============================================================================
// Degradation and Error Tests
// ============================================================================

#[tokio::test]
async fn failed_lookup_still_applies_annotation_configs() {
    let extender = extender(FakeSource::failing());
    let pod = app_pod(Some("app-data:/var/log/app.log"));

    let response = admit(&extender, &pod, "CREATE").await;
    assert!(response.allowed);

    let mutated = apply_patch(&pod, &response);
    assert_eq!(container_names(&mutated), vec!["app", "tailing-sidecar0"]);
}

#[tokio::test]
async fn slow_lookup_is_abandoned_without_rejecting() {
    let source = FakeSource {
        delay: Some(Duration::from_secs(30)),
        ..app_resource()
    };
    let extender = extender(source);
    let pod = app_pod(Some(""));

    let response = admit(&extender, &pod, "CREATE").await;
    assert!(response.allowed);
    assert!(response.patch.is_none());
}

#[tokio::test]
async fn malformed_pod_is_rejected_as_bad_request() {
    let extender = extender(app_resource());
    let object = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "broken", "namespace": NAMESPACE},
        "spec": {"containers": "not-a-list"}
    });

    let body = review_body(object, "CREATE");
    let response = server::review(&*extender, &body)
        .await
        .unwrap()
        .response
        .unwrap();

    assert!(!response.allowed);
    assert_eq!(response.result.code, 400);
    assert!(response.patch.is_none());
}

#[tokio::test]
async fn pod_with_malformed_metadata_is_rejected_as_bad_request() {
    let extender = extender(app_resource());
    let object = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": 5, "namespace": NAMESPACE},
        "spec": {"containers": []}
    });

    let body = review_body(object, "CREATE");
    let response = server::review(&*extender, &body)
        .await
        .expect("review should be answered")
        .response
        .expect("review should carry a response");

    assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
    assert!(!response.allowed);
    assert_eq!(response.result.code, 400);
    assert!(response.result.message.contains("Failed to decode Pod"));
    assert!(response.patch.is_none());
}

#[tokio::test]
async fn unreadable_review_body_is_an_error() {
    let extender = extender(app_resource());
    assert!(server::review(&*extender, b"{not json").await.is_err());
}

#[tokio::test]
async fn unnamed_pod_gets_generate_name_host_path() {
    let extender = extender(app_resource());
    let mut pod = app_pod(Some(""));
    pod.metadata.name = None;
    pod.metadata.generate_name = Some("app-7d9f-".to_string());

    let response = admit(&extender, &pod, "CREATE").await;
    let mutated = apply_patch(&pod, &response);

    let path = &volumes(&mutated)[1].host_path.as_ref().unwrap().path;
    assert!(path.starts_with("/var/log/tailing-sidecar-fluentbit/app-7d9f/"));
    assert!(path.ends_with("/tailing-sidecar0"));
}

#[tokio::test]
async fn pod_namespace_falls_back_to_request_namespace() {
    let extender = extender(app_resource());
    let mut pod = app_pod(Some(""));
    pod.metadata.namespace = None;

    let response = admit(&extender, &pod, "CREATE").await;
    let mutated = apply_patch(&pod, &response);

    assert_eq!(container_names(&mutated), vec!["app", "tailing-sidecar0"]);
    assert_eq!(
        volumes(&mutated)[1].host_path.as_ref().unwrap().path,
        "/var/log/tailing-sidecar-fluentbit/default/app-pod/tailing-sidecar0"
    );
}
