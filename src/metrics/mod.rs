//! Prometheus metrics for the Tailing Sidecar Operator
//!
//! This module exposes metrics for monitoring admission handling and sidecar
//! injection.

pub mod prometheus;

pub use prometheus::*;
