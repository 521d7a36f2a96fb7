//! Shared helpers for controller modules.
//!
//! These functions construct Kubernetes API objects that are reused across
//! the backup/restore handler and the cluster reconciler.  Pure utility
//! functions (naming, hashing, configuration) live in `crate::helpers`.

use std::collections::BTreeMap;

use k8s_openapi::api::{
    batch::v1::{Job, JobSpec},
    core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec, Volume},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

pub const LABEL_APP_KEY: &str = "app";
pub const LABEL_APP_VAL: &str = "aerospike";
pub const LABEL_CLUSTER_KEY: &str = "cluster";

/// Build a controller OwnerReference for any kube-rs `Resource`.
///
/// `K: Resource<DynamicType = ()>` covers every type whose Kubernetes
/// metadata is known at compile time, which includes every struct deriving
/// `CustomResource`.
pub fn controller_owner_ref<K: Resource<DynamicType = ()>>(obj: &K) -> OwnerReference {
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: obj.name_any(),
        uid: obj.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels carried by every object belonging to a cluster; also its selector.
pub fn cluster_labels(cluster: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP_KEY.to_string(), LABEL_APP_VAL.to_string()),
        (LABEL_CLUSTER_KEY.to_string(), cluster.to_string()),
    ])
}

/// Shorthand for a plain-value `EnvVar`.
pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

// ── JobBuilder ──────────────────────────────────────────────────────────────

/// Builder for the batch/v1 `Job`s that run backup and restore tooling.
///
/// Jobs get a fixed name (never `generateName`) so that at most one can exist
/// per request; a second create attempt fails with `AlreadyExists`.
pub struct JobBuilder {
    name: String,
    namespace: String,
    owner_ref: OwnerReference,
    labels: BTreeMap<String, String>,
    volumes: Vec<Volume>,
    containers: Vec<Container>,
    active_deadline: Option<i64>,
}

impl JobBuilder {
    pub fn new(name: &str, ns: &str, owner_ref: OwnerReference) -> Self {
        Self {
            name: name.to_string(),
            namespace: ns.to_string(),
            owner_ref,
            labels: BTreeMap::new(),
            volumes: vec![],
            containers: vec![],
            active_deadline: None,
        }
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn containers(mut self, containers: Vec<Container>) -> Self {
        self.containers = containers;
        self
    }

    pub fn volumes(mut self, volumes: Vec<Volume>) -> Self {
        self.volumes.extend(volumes);
        self
    }

    /// Set `spec.activeDeadlineSeconds` on the Job.
    pub fn active_deadline(mut self, seconds: i64) -> Self {
        self.active_deadline = Some(seconds);
        self
    }

    pub fn build(self) -> Job {
        let labels = (!self.labels.is_empty()).then_some(self.labels);
        Job {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                labels: labels.clone(),
                owner_references: Some(vec![self.owner_ref]),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(0),
                active_deadline_seconds: self.active_deadline,
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels,
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        volumes: (!self.volumes.is_empty()).then_some(self.volumes),
                        containers: self.containers,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
