use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use serde_json::json;

use super::common::*;
use aerospike_operator::api::PatchTarget;
use aerospike_operator::reconciler::{is_member_of, ClusterReconciler, NodeLifecycleManager};

fn reconciler(
    api: &Arc<RecordingApi>,
    events: &Arc<RecordingEvents>,
    probe: &Arc<ScriptedProbe>,
    pods: Vec<Pod>,
) -> ClusterReconciler {
    let lifecycle = NodeLifecycleManager::new(
        api.clone(),
        events.clone(),
        probe.clone(),
        "aerospike/aerospike-server",
        Duration::from_secs(3600),
        Duration::from_secs(5),
    );
    ClusterReconciler::new(api.clone(), cache_of(pods), lifecycle)
}

#[tokio::test]
async fn new_cluster_gets_services_and_first_member() -> anyhow::Result<()> {
    let (api, events, probe) = (RecordingApi::new(), RecordingEvents::new(), ScriptedProbe::clear());
    let cluster = test_cluster("c", 3, &["data"]);

    reconciler(&api, &events, &probe, vec![]).reconcile(&cluster).await?;

    let services = api.created_services();
    let names: Vec<_> = services
        .iter()
        .map(|s| s.metadata.name.clone().unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["c", "c-discovery"]);

    let discovery = services[1].spec.as_ref().unwrap();
    assert_eq!(discovery.cluster_ip.as_deref(), Some("None"));
    assert_eq!(discovery.publish_not_ready_addresses, Some(true));

    let client = services[0].spec.as_ref().unwrap();
    assert_eq!(client.ports.as_ref().unwrap()[0].port, 3000);

    assert_eq!(api.created_pods(), vec!["c-0"]);
    assert_eq!(
        api.patches(),
        vec![(
            PatchTarget::AerospikeCluster,
            "c".to_string(),
            json!({ "status": { "nodeCount": 1 } })
        )]
    );
    Ok(())
}

#[tokio::test]
async fn existing_services_are_left_alone() -> anyhow::Result<()> {
    let (api, events, probe) = (RecordingApi::new(), RecordingEvents::new(), ScriptedProbe::clear());
    api.preexisting("c");
    api.preexisting("c-discovery");
    let cluster = with_node_count(test_cluster("c", 1, &["data"]), 1);

    reconciler(&api, &events, &probe, vec![ready_pod("c", "c-0")])
        .reconcile(&cluster)
        .await?;

    assert!(api.created_pods().is_empty());
    assert!(api.patches().is_empty(), "node count unchanged");
    Ok(())
}

#[tokio::test]
async fn scale_down_removes_one_member_per_pass() -> anyhow::Result<()> {
    let (api, events, probe) = (RecordingApi::new(), RecordingEvents::new(), ScriptedProbe::clear());
    let cluster = with_node_count(test_cluster("c", 1, &["data"]), 3);
    let pods = vec![
        ready_pod("c", "c-0"),
        ready_pod("c", "c-1"),
        ready_pod("c", "c-2"),
    ];

    reconciler(&api, &events, &probe, pods).reconcile(&cluster).await?;

    assert_eq!(api.deleted_pods(), vec!["c-2"]);
    assert_eq!(probe.connects(), vec![pod_ip_for("c-2")]);
    assert_eq!(
        api.patches()[0].2,
        json!({ "status": { "nodeCount": 2 } })
    );
    Ok(())
}

#[tokio::test]
async fn terminating_member_blocks_the_next_removal() -> anyhow::Result<()> {
    let (api, events, probe) = (RecordingApi::new(), RecordingEvents::new(), ScriptedProbe::clear());
    let cluster = with_node_count(test_cluster("c", 1, &["data"]), 2);
    let pods = vec![
        ready_pod("c", "c-0"),
        ready_pod("c", "c-1"),
        terminating(ready_pod("c", "c-2")),
    ];

    let reconciler = reconciler(&api, &events, &probe, pods);
    assert_eq!(reconciler.members("default", "c").len(), 2);
    reconciler.reconcile(&cluster).await?;

    assert!(api.deleted_pods().is_empty(), "c-1 waits until c-2 is gone");
    assert!(probe.connects().is_empty());
    assert!(api.patches().is_empty(), "node count still 2");
    Ok(())
}

#[tokio::test]
async fn terminating_member_blocks_scale_up() -> anyhow::Result<()> {
    let (api, events, probe) = (RecordingApi::new(), RecordingEvents::new(), ScriptedProbe::clear());
    let cluster = with_node_count(test_cluster("c", 3, &["data"]), 2);
    let pods = vec![
        ready_pod("c", "c-0"),
        ready_pod("c", "c-1"),
        terminating(ready_pod("c", "c-2")),
    ];

    reconciler(&api, &events, &probe, pods).reconcile(&cluster).await?;

    assert!(api.created_pods().is_empty());
    assert!(api.patches().is_empty());
    Ok(())
}

#[tokio::test]
async fn other_clusters_pods_are_not_members() -> anyhow::Result<()> {
    let (api, events, probe) = (RecordingApi::new(), RecordingEvents::new(), ScriptedProbe::clear());
    let cluster = with_node_count(test_cluster("c", 1, &["data"]), 1);
    let pods = vec![
        ready_pod("c", "c-0"),
        ready_pod("other", "other-0"),
        ready_pod("other", "other-1"),
    ];

    let reconciler = reconciler(&api, &events, &probe, pods);
    assert_eq!(reconciler.members("default", "c").len(), 1);
    reconciler.reconcile(&cluster).await?;

    assert!(api.deleted_pods().is_empty());
    assert!(api.created_pods().is_empty());
    Ok(())
}

#[test]
fn membership_requires_both_labels() {
    let pod = ready_pod("c", "c-0");
    assert!(is_member_of(&pod, "c"));
    assert!(!is_member_of(&pod, "d"));

    let mut tools = pod.clone();
    tools
        .metadata
        .labels
        .as_mut()
        .unwrap()
        .insert("app".to_string(), "aerospike-tools".to_string());
    assert!(!is_member_of(&tools, "c"));
}
