use std::collections::BTreeMap;

use k8s_openapi::api::{
    batch::v1::Job,
    core::v1::{Container, SecretVolumeSource, Volume, VolumeMount},
};

use crate::controller::helpers::{env, JobBuilder, LABEL_APP_KEY, LABEL_CLUSTER_KEY};
use crate::crd::shared::SECRET_FILE_NAME;
use crate::helpers::client_service_name;
use crate::migration::SERVICE_PORT;

use super::request::ConvergenceRequest;

/// Where the storage secret is mounted inside the tools container.
pub const SECRET_MOUNT_PATH: &str = "/creds";

const SECRET_VOLUME: &str = "storage-credentials";
const TOOLS_CONTAINER: &str = "aerospike-tools";
const TOOLS_APP_LABEL: &str = "aerospike-tools";
const JOB_DEADLINE_SECS: i64 = 24 * 60 * 60;

/// Object name of the artifact a request writes or reads.
pub fn artifact_name(request: &ConvergenceRequest) -> String {
    format!("{}.asb", request.name)
}

/// Build the Job executing `request` with the given tools image.
pub fn build_job(request: &ConvergenceRequest, tools_image: &str) -> Job {
    let target = &request.target;
    let storage = &request.storage;

    let container = Container {
        name: TOOLS_CONTAINER.into(),
        image: Some(tools_image.into()),
        args: Some(vec![request.action.as_str().into()]),
        env: Some(vec![
            env(
                "AEROSPIKE_HOST",
                format!("{}.{}", client_service_name(&target.cluster), request.namespace),
            ),
            env("AEROSPIKE_PORT", SERVICE_PORT.to_string()),
            env("AEROSPIKE_NAMESPACE", target.namespace.clone()),
            env("STORAGE_TYPE", storage.storage_type.as_str()),
            env("BUCKET_NAME", storage.bucket.clone()),
            env("OBJECT_NAME", artifact_name(request)),
            env(
                "GOOGLE_APPLICATION_CREDENTIALS",
                format!("{SECRET_MOUNT_PATH}/{SECRET_FILE_NAME}"),
            ),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: SECRET_VOLUME.into(),
            mount_path: SECRET_MOUNT_PATH.into(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let secret_volume = Volume {
        name: SECRET_VOLUME.into(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(storage.secret.clone()),
            ..Default::default()
        }),
        ..Default::default()
    };

    JobBuilder::new(&request.job_name(), &request.namespace, request.owner_ref.clone())
        .labels(BTreeMap::from([
            (LABEL_APP_KEY.to_string(), TOOLS_APP_LABEL.to_string()),
            (LABEL_CLUSTER_KEY.to_string(), target.cluster.clone()),
        ]))
        .active_deadline(JOB_DEADLINE_SECS)
        .volumes(vec![secret_volume])
        .containers(vec![container])
        .build()
}
