//! Adapters for configuration parsing, lookup and Kubernetes object building

pub mod annotation;
pub mod sidecar_builder;
pub mod tailing_sidecars;
