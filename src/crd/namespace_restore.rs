use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::shared::{BackupRestoreStatus, BackupStorageSpec, TargetNamespace};

/// AerospikeNamespaceRestore restores a backup artifact into an Aerospike
/// namespace.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "aerospike.travelaudience.com",
    version = "v1alpha1",
    kind = "AerospikeNamespaceRestore",
    shortname = "asnr",
    namespaced,
    status = "BackupRestoreStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.target.cluster"}"#,
    printcolumn = r#"{"name": "Namespace", "type": "string", "jsonPath": ".spec.target.namespace"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AerospikeNamespaceRestoreSpec {
    pub target: TargetNamespace,
    pub storage: BackupStorageSpec,
}
