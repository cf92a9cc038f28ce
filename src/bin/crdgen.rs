//! # CRD Generator
//!
//! Prints the `Manifest` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/manifest.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use manifest_controller::crd::Manifest;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Manifest::crd())?);
    Ok(())
}
