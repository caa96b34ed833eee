//! Mutating admission webhook injecting tailing sidecars into Pods

pub mod pod_extender;
pub mod server;
pub mod tls;

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::sidecar_builder::DEFAULT_HOST_PATH_ROOT;

/// Path the API server posts Pod admission reviews to
pub const WEBHOOK_PATH: &str = "/add-tailing-sidecars-v1-pod";

/// Settings applied to every injected sidecar
#[derive(Clone, Debug)]
pub struct InjectionSettings {
    /// Image of the tailing sidecar container
    pub image: String,
    /// Root directory on the node for sidecar staging directories
    pub host_path_root: String,
    /// Upper bound for listing TailingSidecars during one admission call
    pub lookup_timeout: Duration,
}

impl InjectionSettings {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            host_path_root: DEFAULT_HOST_PATH_ROOT.to_string(),
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

/// Extends Pods by tailing sidecar containers
///
/// Shared by every request; holds no per-request state.
pub struct PodExtender<S> {
    /// Where TailingSidecar resources are read from
    pub source: S,
    /// Sidecar injection settings
    pub settings: InjectionSettings,
}

impl<S> PodExtender<S> {
    /// Create a new shared extender
    pub fn new(source: S, settings: InjectionSettings) -> Arc<Self> {
        Arc::new(Self { source, settings })
    }
}
