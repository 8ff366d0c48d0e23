//! Print the CRD manifests of every served kind.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/eks-controlplane.yaml`

use anyhow::Context;
use crds::Registry;

fn main() -> anyhow::Result<()> {
    let registry = Registry::with_defaults();
    let docs = registry
        .crds()
        .iter()
        .map(|crd| serde_yaml::to_string(crd).context("failed to serialize CRD"))
        .collect::<anyhow::Result<Vec<_>>>()?;
    print!("{}", docs.join("---\n"));
    Ok(())
}
