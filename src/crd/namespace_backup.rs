use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::shared::{BackupRestoreStatus, BackupStorageSpec, TargetNamespace};

/// AerospikeNamespaceBackup requests a one-shot backup of an Aerospike
/// namespace to an object store.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "aerospike.travelaudience.com",
    version = "v1alpha1",
    kind = "AerospikeNamespaceBackup",
    shortname = "asnb",
    namespaced,
    status = "BackupRestoreStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.target.cluster"}"#,
    printcolumn = r#"{"name": "Namespace", "type": "string", "jsonPath": ".spec.target.namespace"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AerospikeNamespaceBackupSpec {
    pub target: TargetNamespace,
    pub storage: BackupStorageSpec,
}
