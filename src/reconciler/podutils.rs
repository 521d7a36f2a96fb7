use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

/// Position of a member within its cluster, parsed from the `<cluster>-<n>`
/// pod name.  Names that do not parse are `Unordered`, which sorts after
/// every numbered member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ordinal {
    Index(u32),
    Unordered,
}

impl Ordinal {
    pub fn index(&self) -> Option<u32> {
        match self {
            Ordinal::Index(i) => Some(*i),
            Ordinal::Unordered => None,
        }
    }
}

/// Parse the ordinal of `pod_name` as a member of `cluster`.
pub fn ordinal_of(pod_name: &str, cluster: &str) -> Ordinal {
    pod_name
        .strip_prefix(cluster)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|suffix| suffix.parse().ok())
        .map_or(Ordinal::Unordered, Ordinal::Index)
}

pub fn pod_ordinal(pod: &Pod, cluster: &str) -> Ordinal {
    ordinal_of(&pod.name_any(), cluster)
}

/// Sort members by ascending ordinal.  Unordered members go last, in name
/// order so the result is deterministic.
pub fn sort_by_ordinal(pods: &mut [Arc<Pod>], cluster: &str) {
    pods.sort_by_cached_key(|p| (pod_ordinal(p, cluster), p.name_any()));
}

pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|cs| cs.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
}

pub fn is_pod_running_and_ready(pod: &Pod) -> bool {
    let running = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        == Some("Running");
    running && is_pod_ready(pod)
}

pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|s| s.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}
