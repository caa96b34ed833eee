//! Best-effort lookup of TailingSidecar resources

use std::future::Future;
use std::time::Duration;

use kube::api::ListParams;
use kube::{Api, Client};
use tracing::{debug, error};

use crate::crd::TailingSidecar;
use crate::metrics::prometheus::CONFIG_LOOKUP_FAILURES;
use crate::{Error, Result};

/// Source of the TailingSidecar resources visible in a namespace
pub trait ConfigSource: Send + Sync {
    /// List every TailingSidecar in `namespace`
    fn list_tailing_sidecars(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<TailingSidecar>>> + Send;
}

impl ConfigSource for Client {
    async fn list_tailing_sidecars(&self, namespace: &str) -> Result<Vec<TailingSidecar>> {
        let tailing_sidecars: Api<TailingSidecar> = Api::namespaced(self.clone(), namespace);
        tailing_sidecars
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| {
                Error::KubeError(format!(
                    "Failed to list TailingSidecars in namespace {}: {}",
                    namespace, e
                ))
            })
    }
}

/// List TailingSidecars in `namespace`, degrading to an empty list
///
/// A failed or timed out lookup is logged and counted, never propagated: a
/// Pod is admitted with whatever configs remain available.
pub async fn list_or_empty<S: ConfigSource>(
    source: &S,
    namespace: &str,
    timeout: Duration,
) -> Vec<TailingSidecar> {
    match tokio::time::timeout(timeout, source.list_tailing_sidecars(namespace)).await {
        Ok(Ok(items)) => {
            debug!(namespace, count = items.len(), "Listed TailingSidecars");
            items
        }
        Ok(Err(e)) => {
            CONFIG_LOOKUP_FAILURES.with_label_values(&["error"]).inc();
            error!(namespace, error = %e, "Failed to get list of TailingSidecars in namespace");
            Vec::new()
        }
        Err(_) => {
            CONFIG_LOOKUP_FAILURES.with_label_values(&["timeout"]).inc();
            error!(
                namespace,
                timeout_secs = timeout.as_secs_f64(),
                "Timed out listing TailingSidecars in namespace"
            );
            Vec::new()
        }
    }
}
