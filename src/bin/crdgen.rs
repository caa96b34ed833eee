//! CRD YAML Generator
//!
//! This binary generates Kubernetes CRD manifests for all custom resources
//! read by the tailing-sidecar-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use tailing_sidecar_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
