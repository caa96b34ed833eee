//! Custom Resource Definitions for the Tailing Sidecar Operator

mod tailing_sidecar;

pub use tailing_sidecar::*;

use kube::CustomResourceExt;

use crate::{Error, Result};

/// Generate CRD YAML manifests for all custom resources
pub fn generate_crds() -> Result<Vec<String>> {
    let crd = serde_yaml::to_string(&TailingSidecar::crd())
        .map_err(|e| Error::SerializationError(format!("Failed to render CRD: {}", e)))?;
    Ok(vec![crd])
}
