//! Reconciliation of tailing sidecars in admitted Pods

pub mod sidecars;
