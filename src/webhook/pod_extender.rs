//! Pod mutation handler
//!
//! Extends Pods carrying the `tailing-sidecar` annotation with one tailing
//! sidecar per resolved config, and removes sidecars whose config is gone.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use kube::core::response::Status;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use crate::adapters::annotation::SIDECAR_ANNOTATION;
use crate::adapters::tailing_sidecars::{self, ConfigSource};
use crate::crd::SidecarConfig;
use crate::metrics::prometheus::{
    ADMISSION_DURATION, ADMISSION_REQUESTS, SIDECARS_INJECTED, SIDECARS_REMOVED,
    SIDECAR_CONFIGS_SKIPPED,
};
use crate::reconcilers::sidecars::{self, ReconcileReport};
use crate::{Error, Result};

use super::PodExtender;

/// Decode the admitted object into a Pod
pub fn decode_pod(raw: &serde_json::Value) -> Result<Pod> {
    serde_json::from_value(raw.clone())
        .map_err(|e| Error::DecodeError(format!("Failed to decode Pod: {}", e)))
}

/// Compute the JSON patch turning the original object into the mutated Pod
pub fn build_patch(original: &serde_json::Value, pod: &Pod) -> Result<json_patch::Patch> {
    let mutated = serde_json::to_value(pod)
        .map_err(|e| Error::SerializationError(format!("Failed to serialize Pod: {}", e)))?;
    Ok(json_patch::diff(original, &mutated))
}

/// Rewrite the Pod's containers and volumes for the desired configs
pub fn apply_sidecars(
    pod: &mut Pod,
    desired: &BTreeMap<String, SidecarConfig>,
    host_path_dir: &str,
    image: &str,
) -> ReconcileReport {
    let Some(spec) = pod.spec.as_mut() else {
        return ReconcileReport::default();
    };
    let volumes = spec.volumes.take().unwrap_or_default();

    let reconciled =
        sidecars::reconcile(&spec.containers, &volumes, desired, host_path_dir, image);

    spec.containers = reconciled.containers;
    spec.volumes = if reconciled.volumes.is_empty() && volumes.is_empty() {
        None
    } else {
        Some(reconciled.volumes)
    };
    reconciled.report
}

/// Response rejecting the request with an HTTP-like status code
pub fn errored(
    request: &AdmissionRequest<DynamicObject>,
    code: u16,
    err: &Error,
) -> AdmissionResponse {
    let reason = if code < 500 { "BadRequest" } else { "InternalError" };
    let mut response = AdmissionResponse::from(request);
    response.allowed = false;
    response.result = Status::failure(&err.to_string(), reason).with_code(code);
    response
}

/// Response allowing the request with `patch`, or unchanged if it is empty
pub fn patched(
    request: &AdmissionRequest<DynamicObject>,
    patch: json_patch::Patch,
) -> AdmissionResponse {
    if patch.0.is_empty() {
        return AdmissionResponse::from(request);
    }
    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => response,
        Err(e) => errored(
            request,
            500,
            &Error::SerializationError(format!("Failed to serialize patch: {}", e)),
        ),
    }
}

fn operation_label(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
        #[allow(unreachable_patterns)]
        _ => "UNKNOWN",
    }
}

fn result_label(response: &AdmissionResponse) -> &'static str {
    if !response.allowed {
        "rejected"
    } else if response.patch.is_some() {
        "patched"
    } else {
        "unchanged"
    }
}

impl<S: ConfigSource> PodExtender<S> {
    /// Handle a request to create or update a Pod
    #[instrument(skip(self, request), fields(uid = %request.uid))]
    pub async fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let start = std::time::Instant::now();
        let operation = operation_label(&request.operation);

        let response = self.mutate(request).await;

        ADMISSION_DURATION
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        ADMISSION_REQUESTS
            .with_label_values(&[operation, result_label(&response)])
            .inc();

        response
    }

    /// Reject a request whose admitted object is not a valid Pod
    pub fn reject_malformed(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        err: &Error,
    ) -> AdmissionResponse {
        error!(uid = %request.uid, error = %err, "Rejecting malformed Pod");
        let response = errored(request, 400, err);
        ADMISSION_REQUESTS
            .with_label_values(&[operation_label(&request.operation), result_label(&response)])
            .inc();
        response
    }

    async fn mutate(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let Some(object) = &request.object else {
            debug!("No object in request, allowing unchanged");
            return AdmissionResponse::from(request);
        };

        let decoded = serde_json::to_value(object)
            .map_err(|e| Error::DecodeError(format!("Failed to read admitted object: {}", e)))
            .and_then(|raw| decode_pod(&raw).map(|pod| (raw, pod)));
        let (raw, mut pod) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(error = %e, "Rejecting malformed Pod");
                return errored(request, 400, &e);
            }
        };

        let namespace = pod
            .metadata
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| request.namespace.clone())
            .unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();

        info!(
            name = %name,
            namespace = %namespace,
            operation = operation_label(&request.operation),
            "Handling request for Pod"
        );

        let Some(annotation_value) = pod.annotations().get(SIDECAR_ANNOTATION).cloned() else {
            debug!(
                name = %name,
                namespace = %namespace,
                "No tailing-sidecar annotation, allowing unchanged"
            );
            return AdmissionResponse::from(request);
        };

        let tailing_sidecars =
            tailing_sidecars::list_or_empty(&self.source, &namespace, self.settings.lookup_timeout)
                .await;
        let desired = sidecars::resolve_configs(&tailing_sidecars, &annotation_value);

        if !desired.is_empty() {
            info!(
                name = %name,
                namespace = %namespace,
                configs = desired.len(),
                "Found configuration for Pod"
            );
        }

        let generate_name = pod.metadata.generate_name.clone().unwrap_or_default();
        let host_path_dir = sidecars::host_path_dir(
            &self.settings.host_path_root,
            &namespace,
            &name,
            &generate_name,
            sidecars::fresh_token,
        );

        let report = apply_sidecars(&mut pod, &desired, &host_path_dir, &self.settings.image);
        SIDECARS_INJECTED.inc_by(report.added.len() as f64);
        SIDECARS_REMOVED.inc_by(report.removed.len() as f64);
        SIDECAR_CONFIGS_SKIPPED.inc_by(report.skipped.len() as f64);

        if report.is_noop() {
            debug!(name = %name, namespace = %namespace, "Tailing sidecars up to date");
        }

        match build_patch(&raw, &pod) {
            Ok(patch) => patched(request, patch),
            Err(e) => {
                error!(error = %e, "Failed to build patch for Pod");
                errored(request, 500, &e)
            }
        }
    }
}
