//! Backup/restore handler.
//!
//! Converges one [`ConvergenceRequest`] per call.  Every step is idempotent and
//! the whole pass is safe to repeat; progress is read back from the caches
//! (the deterministic Job and the request's own conditions) rather than kept
//! in memory:
//!
//! 1. terminal condition present: nothing to do;
//! 2. Job already exists: wait, or record its outcome as a terminal condition;
//! 3. target cluster and namespace must exist;
//! 4. storage secret must exist and carry the credentials file;
//! 5. create the Job.
//!
//! Validation failures are reported as Warning events on the request and
//! returned so the work queue retries the pass with backoff.

pub mod job;
pub mod request;
pub mod status;

use std::sync::Arc;

use k8s_openapi::api::{batch::v1::Job, core::v1::Secret};
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::api::ResourceApi;
use crate::cache::ResourceCache;
use crate::crd::aerospike_cluster::AerospikeCluster;
use crate::crd::shared::{Condition, ConditionStatus, SECRET_FILE_NAME};
use crate::error::{Error, Result};
use crate::events::{
    EventReporter, Severity, REASON_INVALID_SECRET, REASON_INVALID_TARGET, REASON_JOB_CREATED,
    REASON_JOB_FAILED,
};

pub use request::{Action, ConvergenceRequest};

/// Observed state of the Job belonging to a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Absent,
    Active,
    Succeeded,
    Failed,
}

impl JobOutcome {
    pub fn of(job: Option<&Job>) -> Self {
        let Some(job) = job else {
            return JobOutcome::Absent;
        };
        let status = job.status.as_ref();
        let has_condition = |type_: &str| {
            status
                .and_then(|s| s.conditions.as_ref())
                .is_some_and(|cs| cs.iter().any(|c| c.type_ == type_ && c.status == "True"))
        };
        if status.and_then(|s| s.succeeded).unwrap_or(0) > 0 || has_condition("Complete") {
            JobOutcome::Succeeded
        } else if status.and_then(|s| s.failed).unwrap_or(0) > 0 || has_condition("Failed") {
            JobOutcome::Failed
        } else {
            JobOutcome::Active
        }
    }
}

pub struct BackupRestoreHandler {
    api: Arc<dyn ResourceApi>,
    events: Arc<dyn EventReporter>,
    clusters: ResourceCache<AerospikeCluster>,
    jobs: ResourceCache<Job>,
    secrets: ResourceCache<Secret>,
    tools_image: String,
}

impl BackupRestoreHandler {
    pub fn new(
        api: Arc<dyn ResourceApi>,
        events: Arc<dyn EventReporter>,
        clusters: ResourceCache<AerospikeCluster>,
        jobs: ResourceCache<Job>,
        secrets: ResourceCache<Secret>,
        tools_image: impl Into<String>,
    ) -> Self {
        Self {
            api,
            events,
            clusters,
            jobs,
            secrets,
            tools_image: tools_image.into(),
        }
    }

    /// Run one convergence pass for `request`.
    pub async fn handle(&self, mut request: ConvergenceRequest) -> Result<()> {
        let key = request.key();
        let action = request.action;
        debug!(%key, %action, "checking whether action is needed");

        if status::is_failed_or_finished(&request) {
            debug!(%key, %action, "action has already finished");
            return Ok(());
        }

        let job_name = request.job_name();
        match JobOutcome::of(self.jobs.get(&request.namespace, &job_name).as_deref()) {
            JobOutcome::Absent => {}
            JobOutcome::Active => {
                debug!(%key, %action, job = %job_name, "job still running");
                return Ok(());
            }
            JobOutcome::Succeeded => return self.mark_finished(&mut request, &job_name).await,
            JobOutcome::Failed => return self.mark_failed(&mut request, &job_name).await,
        }

        self.ensure_target(&request).await?;
        self.ensure_secret(&request).await?;
        self.create_job(&mut request).await
    }

    async fn ensure_target(&self, request: &ConvergenceRequest) -> Result<()> {
        let target = &request.target;
        let Some(cluster) = self.clusters.get(&request.namespace, &target.cluster) else {
            self.warn(request, REASON_INVALID_TARGET, format!("cluster {} does not exist", target.cluster))
                .await;
            return Err(Error::ClusterNotFound(target.cluster.clone()));
        };
        if !cluster.has_namespace(&target.namespace) {
            self.warn(
                request,
                REASON_INVALID_TARGET,
                format!(
                    "cluster {} does not contain a namespace named {}",
                    target.cluster, target.namespace
                ),
            )
            .await;
            return Err(Error::NamespaceNotExists {
                cluster: target.cluster.clone(),
                namespace: target.namespace.clone(),
            });
        }
        Ok(())
    }

    async fn ensure_secret(&self, request: &ConvergenceRequest) -> Result<()> {
        let secret_name = &request.storage.secret;
        let Some(secret) = self.secrets.get(&request.namespace, secret_name) else {
            self.warn(
                request,
                REASON_INVALID_SECRET,
                "specified secret does not exist".to_string(),
            )
            .await;
            return Err(Error::SecretNotFound(secret_name.clone()));
        };
        if !secret_has_file(&secret, SECRET_FILE_NAME) {
            self.warn(
                request,
                REASON_INVALID_SECRET,
                format!("secret does not contain expected file (Expected \"{SECRET_FILE_NAME}\")"),
            )
            .await;
            return Err(Error::InvalidSecretFileName {
                secret: secret_name.clone(),
                file: SECRET_FILE_NAME.to_string(),
            });
        }
        Ok(())
    }

    async fn create_job(&self, request: &mut ConvergenceRequest) -> Result<()> {
        let key = request.key();
        let action = request.action;
        let job = job::build_job(request, &self.tools_image);
        let job_name = job.name_any();

        match self.api.create_job(&request.namespace, &job).await {
            Ok(_) => {
                info!(%key, %action, job = %job_name, "created job");
                self.events
                    .record(
                        &request.object_ref,
                        Severity::Normal,
                        REASON_JOB_CREATED,
                        format!("created {action} job {job_name}"),
                    )
                    .await;
            }
            Err(e) if e.is_already_exists() => {
                debug!(%key, %action, job = %job_name, "job already exists");
            }
            Err(e) => return Err(e),
        }

        let started = action.started_condition_type();
        if !status::has_condition(request, started) {
            let condition = Condition::new(started, ConditionStatus::True)
                .with_reason(REASON_JOB_CREATED, format!("job {job_name} created"));
            status::append_condition(self.api.as_ref(), request, condition).await?;
        }
        Ok(())
    }

    async fn mark_finished(&self, request: &mut ConvergenceRequest, job_name: &str) -> Result<()> {
        info!(key = %request.key(), action = %request.action, job = %job_name, "job succeeded");
        let condition = Condition::new(request.action.finished_condition_type(), ConditionStatus::True)
            .with_reason("JobSucceeded", format!("job {job_name} succeeded"));
        status::append_condition(self.api.as_ref(), request, condition).await
    }

    async fn mark_failed(&self, request: &mut ConvergenceRequest, job_name: &str) -> Result<()> {
        warn!(key = %request.key(), action = %request.action, job = %job_name, "job failed");
        self.warn(
            request,
            REASON_JOB_FAILED,
            format!("{} job {job_name} failed", request.action),
        )
        .await;
        let condition = Condition::new(request.action.failed_condition_type(), ConditionStatus::True)
            .with_reason(REASON_JOB_FAILED, format!("job {job_name} failed"));
        status::append_condition(self.api.as_ref(), request, condition).await
    }

    async fn warn(&self, request: &ConvergenceRequest, reason: &str, message: String) {
        self.events
            .record(&request.object_ref, Severity::Warning, reason, message)
            .await;
    }
}

/// Whether a Secret carries an entry under `file`, in either `data` or
/// `stringData`.
pub fn secret_has_file(secret: &Secret, file: &str) -> bool {
    secret.data.as_ref().is_some_and(|d| d.contains_key(file))
        || secret.string_data.as_ref().is_some_and(|d| d.contains_key(file))
}
