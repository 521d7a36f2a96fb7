//! Node lifecycle: ordered member creation and migration-gated removal.
//!
//! Members are ordered by the ordinal in their name.  Scale-up fills the
//! lowest missing ordinal and scale-down removes the highest ordinal, one
//! member per pass in both directions.  Both keep the ordinal range dense.
//!
//! Removing a member that is still handing partitions to its peers loses
//! data, so every removal waits until the data layer on that member reports
//! no migrations in flight.  A member that never settles within the timeout
//! fails the pass and is left running; the queue retries later.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::api::ResourceApi;
use crate::crd::aerospike_cluster::AerospikeCluster;
use crate::error::{Error, Result};
use crate::events::{
    object_ref, EventReporter, Severity, REASON_MEMBER_CREATED, REASON_MEMBER_REMOVED,
    REASON_MIGRATION_TIMEOUT,
};
use crate::helpers::pod_name;
use crate::migration::{wait_for_migrations, MigrationProbe};

use super::podutils::{is_pod_running_and_ready, pod_ip, pod_ordinal, sort_by_ordinal};

pub struct NodeLifecycleManager {
    api: Arc<dyn ResourceApi>,
    events: Arc<dyn EventReporter>,
    probe: Arc<dyn MigrationProbe>,
    image_repo: String,
    migration_timeout: Duration,
    poll_interval: Duration,
}

impl NodeLifecycleManager {
    pub fn new(
        api: Arc<dyn ResourceApi>,
        events: Arc<dyn EventReporter>,
        probe: Arc<dyn MigrationProbe>,
        image_repo: impl Into<String>,
        migration_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            events,
            probe,
            image_repo: image_repo.into(),
            migration_timeout,
            poll_interval,
        }
    }

    /// Remove the highest-ordinal member beyond `desired`, once the data
    /// layer on it reports no migrations in flight.
    ///
    /// At most one member is removed per pass: the next candidate is only
    /// considered after the removed pod is gone from the cache and its
    /// partitions have started moving.  Returns without error and without
    /// removing anything while the candidate is not yet running and ready.
    pub async fn scale_down(
        &self,
        cluster: &AerospikeCluster,
        members: &[Arc<Pod>],
        desired: usize,
    ) -> Result<Option<String>> {
        let cluster_name = cluster.name_any();
        let Some(pod) = removal_candidates(members, &cluster_name, desired)
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let name = pod.name_any();
        if !is_pod_running_and_ready(&pod) {
            debug!(cluster = %cluster_name, pod = %name, "removal candidate not ready yet");
            return Ok(None);
        }
        let Some(address) = pod_ip(&pod) else {
            debug!(cluster = %cluster_name, pod = %name, "removal candidate has no address yet");
            return Ok(None);
        };

        debug!(cluster = %cluster_name, pod = %name, "waiting for migrations to finish");
        match wait_for_migrations(
            self.probe.as_ref(),
            address,
            self.migration_timeout,
            self.poll_interval,
        )
        .await
        {
            Ok(()) => {}
            Err(e @ Error::MigrationTimeout { .. }) => {
                warn!(cluster = %cluster_name, pod = %name, %e, "migrations did not finish");
                self.events
                    .record(
                        &object_ref(cluster),
                        Severity::Warning,
                        REASON_MIGRATION_TIMEOUT,
                        format!("migrations on {name} did not finish within {:?}", self.migration_timeout),
                    )
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let ns = pod.namespace().unwrap_or_default();
        match self.api.delete_pod(&ns, &name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(cluster = %cluster_name, pod = %name, "pod already gone");
            }
            Err(e) => return Err(e),
        }
        info!(cluster = %cluster_name, pod = %name, "removed member");
        self.events
            .record(
                &object_ref(cluster),
                Severity::Normal,
                REASON_MEMBER_REMOVED,
                format!("removed member {name}"),
            )
            .await;
        Ok(Some(name))
    }

    /// Create the lowest missing member if fewer than `desired` exist and
    /// every existing member is running and ready.  Returns the name of the
    /// member created, if any.
    pub async fn scale_up(
        &self,
        cluster: &AerospikeCluster,
        members: &[Arc<Pod>],
        desired: usize,
    ) -> Result<Option<String>> {
        if members.len() >= desired {
            return Ok(None);
        }
        let cluster_name = cluster.name_any();
        if let Some(pending) = members.iter().find(|p| !is_pod_running_and_ready(p)) {
            debug!(cluster = %cluster_name, pod = %pending.name_any(), "waiting for member to become ready");
            return Ok(None);
        }

        let ordinal = lowest_missing_ordinal(members, &cluster_name);
        let name = pod_name(&cluster_name, ordinal);
        let pod = super::pods::member_pod(cluster, ordinal, &self.image_repo);
        let ns = cluster.namespace().unwrap_or_default();

        match self.api.create_pod(&ns, &pod).await {
            Ok(_) => {
                info!(cluster = %cluster_name, pod = %name, "created member");
                self.events
                    .record(
                        &object_ref(cluster),
                        Severity::Normal,
                        REASON_MEMBER_CREATED,
                        format!("created member {name}"),
                    )
                    .await;
            }
            Err(e) if e.is_already_exists() => {
                debug!(cluster = %cluster_name, pod = %name, "member already exists");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        Ok(Some(name))
    }
}

/// Smallest ordinal not taken by any member.
pub fn lowest_missing_ordinal(members: &[Arc<Pod>], cluster: &str) -> u32 {
    let mut taken: Vec<u32> = members
        .iter()
        .filter_map(|p| pod_ordinal(p, cluster).index())
        .collect();
    taken.sort_unstable();
    taken.dedup();
    let mut next = 0;
    for i in taken {
        if i != next {
            break;
        }
        next += 1;
    }
    next
}

/// Members beyond `desired`, highest ordinal first.  Unordered members sort
/// after every numbered one and so are removed first.
pub fn removal_candidates(members: &[Arc<Pod>], cluster: &str, desired: usize) -> Vec<Arc<Pod>> {
    let mut sorted = members.to_vec();
    sort_by_ordinal(&mut sorted, cluster);
    sorted.into_iter().skip(desired).rev().collect()
}
