use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::controller::helpers::{cluster_labels, controller_owner_ref};
use crate::crd::aerospike_cluster::AerospikeCluster;
use crate::helpers::{client_service_name, discovery_service_name};
use crate::migration::SERVICE_PORT;

pub const SERVICE_PORT_NAME: &str = "service";
pub const HEARTBEAT_PORT: u16 = 3002;
pub const HEARTBEAT_PORT_NAME: &str = "heartbeat";

/// Service clients use to reach the cluster.
pub fn client_service(cluster: &AerospikeCluster) -> Service {
    let name = cluster.name_any();
    Service {
        metadata: service_meta(cluster, client_service_name(&name), None),
        spec: Some(ServiceSpec {
            selector: Some(cluster_labels(&name)),
            ports: Some(vec![port(SERVICE_PORT_NAME, SERVICE_PORT)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Headless service giving every member a stable DNS name for the mesh
/// heartbeat.  Members must be resolvable before they are ready.
pub fn discovery_service(cluster: &AerospikeCluster) -> Service {
    let name = cluster.name_any();
    let annotations = BTreeMap::from([(
        "service.alpha.kubernetes.io/tolerate-unready-endpoints".to_string(),
        "true".to_string(),
    )]);
    Service {
        metadata: service_meta(cluster, discovery_service_name(&name), Some(annotations)),
        spec: Some(ServiceSpec {
            selector: Some(cluster_labels(&name)),
            ports: Some(vec![port(HEARTBEAT_PORT_NAME, HEARTBEAT_PORT)]),
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_meta(
    cluster: &AerospikeCluster,
    name: String,
    annotations: Option<BTreeMap<String, String>>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        labels: Some(cluster_labels(&cluster.name_any())),
        annotations,
        owner_references: Some(vec![controller_owner_ref(cluster)]),
        ..Default::default()
    }
}

fn port(name: &str, number: u16) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port: i32::from(number),
        target_port: Some(IntOrString::String(name.to_string())),
        ..Default::default()
    }
}
