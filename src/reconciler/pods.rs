use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, Probe, TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::controller::helpers::{cluster_labels, controller_owner_ref};
use crate::crd::aerospike_cluster::AerospikeCluster;
use crate::helpers::{discovery_service_name, pod_name};
use crate::migration::SERVICE_PORT;

use super::services::{HEARTBEAT_PORT, HEARTBEAT_PORT_NAME, SERVICE_PORT_NAME};

pub const FABRIC_PORT: u16 = 3001;
pub const INFO_PORT: u16 = 3003;
const SERVER_CONTAINER: &str = "aerospike-server";

/// Build the member pod with the given ordinal.
///
/// The hostname and subdomain make the member resolvable as
/// `<pod>.<cluster>-discovery`, which is what the mesh heartbeat relies on.
pub fn member_pod(cluster: &AerospikeCluster, ordinal: u32, image_repo: &str) -> Pod {
    let cluster_name = cluster.name_any();
    let name = pod_name(&cluster_name, ordinal);

    let container = Container {
        name: SERVER_CONTAINER.into(),
        image: Some(format!("{image_repo}:{}", cluster.spec.version)),
        ports: Some(vec![
            container_port(SERVICE_PORT_NAME, SERVICE_PORT),
            container_port("fabric", FABRIC_PORT),
            container_port(HEARTBEAT_PORT_NAME, HEARTBEAT_PORT),
            container_port("info", INFO_PORT),
        ]),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::String(SERVICE_PORT_NAME.into()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(5),
            period_seconds: Some(10),
            ..Default::default()
        }),
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: cluster.namespace(),
            labels: Some(cluster_labels(&cluster_name)),
            owner_references: Some(vec![controller_owner_ref(cluster)]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            hostname: Some(name),
            subdomain: Some(discovery_service_name(&cluster_name)),
            containers: vec![container],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container_port(name: &str, number: u16) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: i32::from(number),
        ..Default::default()
    }
}
