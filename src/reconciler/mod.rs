//! AerospikeCluster reconciler.
//!
//! Ensures the networking primitives exist, hands membership changes to the
//! [`NodeLifecycleManager`] and reports the observed member count back into
//! the cluster status.  No membership change starts while a member is still
//! terminating.

pub mod lifecycle;
pub mod podutils;
pub mod pods;
pub mod services;

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Pod, Service};
use kube::ResourceExt;
use serde_json::json;
use tracing::debug;

use crate::api::{PatchTarget, ResourceApi};
use crate::cache::ResourceCache;
use crate::controller::helpers::{LABEL_APP_KEY, LABEL_APP_VAL, LABEL_CLUSTER_KEY};
use crate::crd::aerospike_cluster::AerospikeCluster;
use crate::error::Result;

pub use lifecycle::NodeLifecycleManager;

pub struct ClusterReconciler {
    api: Arc<dyn ResourceApi>,
    pods: ResourceCache<Pod>,
    lifecycle: NodeLifecycleManager,
}

impl ClusterReconciler {
    pub fn new(
        api: Arc<dyn ResourceApi>,
        pods: ResourceCache<Pod>,
        lifecycle: NodeLifecycleManager,
    ) -> Self {
        Self {
            api,
            pods,
            lifecycle,
        }
    }

    /// Run one convergence pass for `cluster`.
    pub async fn reconcile(&self, cluster: &AerospikeCluster) -> Result<()> {
        let name = cluster.name_any();
        let ns = cluster.namespace().unwrap_or_default();

        self.ensure_service(cluster, services::client_service(cluster)).await?;
        self.ensure_service(cluster, services::discovery_service(cluster)).await?;

        let pods = self.cluster_pods(&ns, &name);
        let (terminating, members): (Vec<_>, Vec<_>) =
            pods.into_iter().partition(|p| podutils::is_terminating(p));
        let desired = usize::try_from(cluster.spec.node_count).unwrap_or(0);
        debug!(cluster = %name, current = members.len(), desired, "observed members");

        let mut current = members.len();
        if let Some(leaving) = terminating.first() {
            // Its deletion re-enqueues the cluster.
            debug!(cluster = %name, pod = %leaving.name_any(), "member still terminating, not scaling");
        } else if current > desired {
            if self.lifecycle.scale_down(cluster, &members, desired).await?.is_some() {
                current -= 1;
            }
        } else if current < desired
            && self.lifecycle.scale_up(cluster, &members, desired).await?.is_some()
        {
            current += 1;
        }

        self.update_node_count(cluster, current).await
    }

    /// Every pod carrying the cluster's labels, including those being deleted.
    fn cluster_pods(&self, ns: &str, cluster: &str) -> Vec<Arc<Pod>> {
        self.pods
            .list(ns)
            .into_iter()
            .filter(|p| is_member_of(p, cluster))
            .collect()
    }

    /// Live members of the cluster: pods carrying its labels that are not
    /// already being deleted.
    pub fn members(&self, ns: &str, cluster: &str) -> Vec<Arc<Pod>> {
        self.cluster_pods(ns, cluster)
            .into_iter()
            .filter(|p| !podutils::is_terminating(p))
            .collect()
    }

    async fn ensure_service(&self, cluster: &AerospikeCluster, service: Service) -> Result<()> {
        let ns = cluster.namespace().unwrap_or_default();
        let service_name = service.name_any();
        match self.api.create_service(&ns, &service).await {
            Ok(_) => {
                debug!(cluster = %cluster.name_any(), service = %service_name, "service created");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(cluster = %cluster.name_any(), service = %service_name, "service already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update_node_count(&self, cluster: &AerospikeCluster, current: usize) -> Result<()> {
        let current = i32::try_from(current).unwrap_or(i32::MAX);
        let observed = cluster.status.as_ref().and_then(|s| s.node_count);
        if observed == Some(current) {
            return Ok(());
        }
        let patch = json!({ "status": { "nodeCount": current } });
        self.api
            .merge_patch_status(
                PatchTarget::AerospikeCluster,
                &cluster.namespace().unwrap_or_default(),
                &cluster.name_any(),
                &patch,
            )
            .await
    }
}

/// Whether `pod` carries the labels of a member of `cluster`.
pub fn is_member_of(pod: &Pod, cluster: &str) -> bool {
    let labels = pod.labels();
    labels.get(LABEL_APP_KEY).map(String::as_str) == Some(LABEL_APP_VAL)
        && labels.get(LABEL_CLUSTER_KEY).map(String::as_str) == Some(cluster)
}
