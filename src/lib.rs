//! Tailing Sidecar Kubernetes Operator
//!
//! A mutating admission webhook that injects log tailing sidecars into Pods,
//! configured by TailingSidecar resources and the `tailing-sidecar` Pod
//! annotation.

pub mod adapters;
pub mod config;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod webhook;

pub use error::{Error, Result};
