//! TailingSidecar Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// TailingSidecar resource specification
///
/// Every TailingSidecar in a namespace contributes its configs to each Pod
/// in that namespace carrying the `tailing-sidecar` annotation.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "tailing-sidecar.sumologic.com",
    version = "v1",
    kind = "TailingSidecar",
    plural = "tailingsidecars",
    singular = "tailingsidecar",
    namespaced,
    status = "TailingSidecarStatus",
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TailingSidecarSpec {
    /// Named tailing configurations
    #[serde(default)]
    pub configs: BTreeMap<String, SidecarConfig>,
}

/// A single file to tail from a volume already mounted in the Pod
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct SidecarConfig {
    /// Absolute path of the file to tail
    #[serde(default)]
    pub file: String,

    /// Name of a volume mount present in one of the Pod's containers
    #[serde(default)]
    pub volume: String,
}

impl SidecarConfig {
    /// Create a config tailing `file` from the mount named `volume`
    pub fn new(file: impl Into<String>, volume: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            volume: volume.into(),
        }
    }
}

/// TailingSidecar status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TailingSidecarStatus {}
