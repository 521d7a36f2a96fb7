use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use crate::cache::{ObjectKey, ResourceCache};
use crate::crd::aerospike_cluster::AerospikeCluster;
use crate::error::Result;
use crate::reconciler::ClusterReconciler;

use super::generic::SyncHandler;
use super::helpers::{LABEL_APP_KEY, LABEL_APP_VAL, LABEL_CLUSTER_KEY};

pub const CONTROLLER_NAME: &str = "aerospikecluster";

pub struct ClusterSync {
    clusters: ResourceCache<AerospikeCluster>,
    reconciler: Arc<ClusterReconciler>,
}

impl ClusterSync {
    pub fn new(clusters: ResourceCache<AerospikeCluster>, reconciler: Arc<ClusterReconciler>) -> Self {
        Self {
            clusters,
            reconciler,
        }
    }
}

#[async_trait::async_trait]
impl SyncHandler for ClusterSync {
    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let Some(cluster) = self.clusters.get_key(key) else {
            debug!(%key, "aerospikecluster in work queue no longer exists");
            return Ok(());
        };
        self.reconciler.reconcile(&cluster).await
    }
}

/// Map a member pod to the key of the cluster it belongs to.
pub fn pod_cluster_key(pod: &Pod) -> Option<ObjectKey> {
    let labels = pod.metadata.labels.as_ref()?;
    if labels.get(LABEL_APP_KEY).map(String::as_str) != Some(LABEL_APP_VAL) {
        return None;
    }
    let cluster = labels.get(LABEL_CLUSTER_KEY)?;
    Some(ObjectKey::new(
        pod.metadata.namespace.clone().unwrap_or_default(),
        cluster.clone(),
    ))
}
