//! Generate CRD YAML from Rust types.
//!
//! Usage:
//!   cargo run --bin crdgen                        # all CRDs to stdout
//!   cargo run --bin crdgen -- --out-dir ./crds    # one file per CRD

use std::path::PathBuf;

use aerospike_operator::crd::{
    aerospike_cluster::AerospikeCluster, namespace_backup::AerospikeNamespaceBackup,
    namespace_restore::AerospikeNamespaceRestore,
};
use anyhow::Context;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let out_dir: Option<PathBuf> = std::env::args()
        .skip_while(|a| a != "--out-dir")
        .nth(1)
        .map(PathBuf::from);

    let crds = vec![
        (
            "aerospikecluster-crd.yaml",
            serde_yaml::to_string(&AerospikeCluster::crd())?,
        ),
        (
            "aerospikenamespacebackup-crd.yaml",
            serde_yaml::to_string(&AerospikeNamespaceBackup::crd())?,
        ),
        (
            "aerospikenamespacerestore-crd.yaml",
            serde_yaml::to_string(&AerospikeNamespaceRestore::crd())?,
        ),
    ];

    match out_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            for (name, yaml) in &crds {
                let path = dir.join(name);
                std::fs::write(&path, format!("---\n{yaml}"))
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("wrote {}", path.display());
            }
        }
        None => {
            for (_name, yaml) in &crds {
                println!("---\n{yaml}");
            }
        }
    }
    Ok(())
}
