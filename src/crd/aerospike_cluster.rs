use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::shared::Condition;

/// StorageSpec configures the persistence of one Aerospike namespace.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StorageSpec {
    #[serde(rename = "type")]
    pub storage_type: String,
    pub size: String,
}

/// AerospikeNamespaceSpec declares one namespace served by the cluster.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AerospikeNamespaceSpec {
    pub name: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<String>,

    #[serde(default, rename = "defaultTTL", skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<String>,

    pub storage: StorageSpec,
}

fn default_replication_factor() -> i32 {
    2
}

/// AerospikeCluster declares an Aerospike cluster and the namespaces it serves.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "aerospike.travelaudience.com",
    version = "v1alpha1",
    kind = "AerospikeCluster",
    shortname = "asc",
    namespaced,
    status = "AerospikeClusterStatus",
    scale = r#"{"specReplicasPath": ".spec.nodeCount", "statusReplicasPath": ".status.nodeCount"}"#,
    printcolumn = r#"{"name": "Version", "type": "string", "jsonPath": ".spec.version"}"#,
    printcolumn = r#"{"name": "Desired", "type": "integer", "jsonPath": ".spec.nodeCount"}"#,
    printcolumn = r#"{"name": "Current", "type": "integer", "jsonPath": ".status.nodeCount"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AerospikeClusterSpec {
    pub version: String,

    pub node_count: i32,

    pub namespaces: Vec<AerospikeNamespaceSpec>,
}

impl AerospikeCluster {
    pub fn has_namespace(&self, name: &str) -> bool {
        self.spec.namespaces.iter().any(|ns| ns.name == name)
    }
}

/// AerospikeClusterStatus defines the observed state of AerospikeCluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AerospikeClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
