use std::sync::Arc;

use serde_json::json;

use super::common::*;
use aerospike_operator::api::PatchTarget;
use aerospike_operator::backuprestore::{BackupRestoreHandler, ConvergenceRequest};
use aerospike_operator::crd::aerospike_cluster::AerospikeCluster;
use aerospike_operator::crd::shared::{Condition, ConditionStatus};
use aerospike_operator::error::Error;
use aerospike_operator::events::Severity;
use aerospike_operator::helpers::job_name;
use k8s_openapi::api::{batch::v1::Job, core::v1::Secret};

const TOOLS_IMAGE: &str = "tools:test";

struct Harness {
    api: Arc<RecordingApi>,
    events: Arc<RecordingEvents>,
    handler: BackupRestoreHandler,
}

fn harness(clusters: Vec<AerospikeCluster>, jobs: Vec<Job>, secrets: Vec<Secret>) -> Harness {
    let api = RecordingApi::new();
    let events = RecordingEvents::new();
    let handler = BackupRestoreHandler::new(
        api.clone(),
        events.clone(),
        cache_of(clusters),
        cache_of(jobs),
        cache_of(secrets),
        TOOLS_IMAGE,
    );
    Harness {
        api,
        events,
        handler,
    }
}

fn valid_world() -> Harness {
    harness(
        vec![test_cluster("as", 3, &["data"])],
        vec![],
        vec![valid_secret("gcs")],
    )
}

fn backup_request(conditions: Vec<Condition>) -> ConvergenceRequest {
    ConvergenceRequest::from(&test_backup("nightly", "as", "data", "gcs", conditions))
}

// ── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn creates_job_with_deterministic_name() -> anyhow::Result<()> {
    let h = valid_world();
    h.handler.handle(backup_request(vec![])).await?;

    let jobs = h.api.created_jobs();
    assert_eq!(jobs.len(), 1);
    let expected = job_name("backup", "nightly", "nightly-uid");
    assert_eq!(jobs[0].metadata.name.as_deref(), Some(expected.as_str()));

    let owner = &jobs[0].metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "AerospikeNamespaceBackup");
    assert_eq!(owner.name, "nightly");
    assert_eq!(owner.controller, Some(true));

    let pod = jobs[0].spec.as_ref().unwrap().template.spec.as_ref().unwrap();
    assert_eq!(pod.containers[0].image.as_deref(), Some(TOOLS_IMAGE));
    assert_eq!(pod.containers[0].args, Some(vec!["backup".to_string()]));
    let secret_volume = pod.volumes.as_ref().unwrap()[0].secret.as_ref().unwrap();
    assert_eq!(secret_volume.secret_name.as_deref(), Some("gcs"));

    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "JobCreated");
    assert_eq!(events[0].severity, Severity::Normal);
    assert_eq!(events[0].object, "nightly");
    Ok(())
}

#[tokio::test]
async fn records_started_condition_after_creating_job() -> anyhow::Result<()> {
    let h = valid_world();
    h.handler.handle(backup_request(vec![])).await?;

    let patches = h.api.patches();
    assert_eq!(patches.len(), 1);
    let (target, name, patch) = &patches[0];
    assert_eq!(*target, PatchTarget::AerospikeNamespaceBackup);
    assert_eq!(name, "nightly");
    let conditions = &patch["status"]["conditions"];
    assert_eq!(conditions.as_array().map(Vec::len), Some(1));
    assert_eq!(conditions[0]["type"], "BackupStarted");
    assert_eq!(conditions[0]["status"], "True");
    assert!(conditions[0]["lastTransitionTime"].is_string());
    Ok(())
}

#[tokio::test]
async fn repeated_passes_never_create_a_second_job() -> anyhow::Result<()> {
    let h = valid_world();
    let started = Condition::new("BackupStarted", ConditionStatus::True);

    h.handler.handle(backup_request(vec![])).await?;
    // The job watch has not caught up yet: the cache still has no Job.
    h.handler.handle(backup_request(vec![started])).await?;

    // Both passes tried the same name; the second got AlreadyExists.
    let names: Vec<_> = h
        .api
        .created_jobs()
        .into_iter()
        .map(|j| j.metadata.name.unwrap_or_default())
        .collect();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0], names[1]);
    assert_eq!(h.events.reasons(), vec!["JobCreated"]);
    assert_eq!(h.api.patches().len(), 1);
    Ok(())
}

// ── Job outcome ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn running_job_is_left_alone() -> anyhow::Result<()> {
    let name = job_name("backup", "nightly", "nightly-uid");
    let h = harness(
        vec![test_cluster("as", 3, &["data"])],
        vec![test_job(&name, None)],
        vec![valid_secret("gcs")],
    );
    h.handler.handle(backup_request(vec![])).await?;

    assert!(h.api.calls().is_empty());
    assert!(h.events.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn succeeded_job_appends_finished_condition_as_minimal_patch() -> anyhow::Result<()> {
    let name = job_name("backup", "nightly", "nightly-uid");
    let h = harness(
        vec![test_cluster("as", 3, &["data"])],
        vec![test_job(&name, Some(true))],
        vec![valid_secret("gcs")],
    );
    let started = Condition::new("BackupStarted", ConditionStatus::True);
    h.handler.handle(backup_request(vec![started])).await?;

    let patches = h.api.patches();
    assert_eq!(patches.len(), 1);
    let patch = &patches[0].2;
    // Only the condition list, replaced as a whole.
    assert_eq!(patch.as_object().map(|o| o.len()), Some(1));
    assert_eq!(patch["status"].as_object().map(|o| o.len()), Some(1));
    let conditions = patch["status"]["conditions"].as_array().unwrap();
    assert_eq!(conditions.len(), 2);
    assert_eq!(conditions[0], json!({"type": "BackupStarted", "status": "True"}));
    assert_eq!(conditions[1]["type"], "BackupFinished");
    assert_eq!(conditions[1]["status"], "True");

    assert!(h.api.created_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_job_appends_failed_condition_and_warns() -> anyhow::Result<()> {
    let name = job_name("backup", "nightly", "nightly-uid");
    let h = harness(
        vec![test_cluster("as", 3, &["data"])],
        vec![test_job(&name, Some(false))],
        vec![valid_secret("gcs")],
    );
    h.handler.handle(backup_request(vec![])).await?;

    let patches = h.api.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].2["status"]["conditions"][0]["type"], "BackupFailed");

    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "JobFailed");
    assert_eq!(events[0].severity, Severity::Warning);
    assert!(h.api.created_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn terminal_request_is_a_no_op() -> anyhow::Result<()> {
    for terminal in ["BackupFinished", "BackupFailed"] {
        let h = valid_world();
        let conditions = vec![Condition::new(terminal, ConditionStatus::True)];
        h.handler.handle(backup_request(conditions)).await?;
        assert!(h.api.calls().is_empty(), "{terminal} should stop the pass");
        assert!(h.events.events().is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn non_true_terminal_condition_does_not_stop_the_pass() -> anyhow::Result<()> {
    let h = valid_world();
    let conditions = vec![Condition::new("BackupFinished", ConditionStatus::False)];
    h.handler.handle(backup_request(conditions)).await?;
    assert_eq!(h.api.created_jobs().len(), 1);
    Ok(())
}

// ── Validation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_cluster_is_reported_and_returned() {
    let h = harness(vec![], vec![], vec![valid_secret("gcs")]);
    let err = h.handler.handle(backup_request(vec![])).await.unwrap_err();

    assert!(matches!(err, Error::ClusterNotFound(ref c) if c == "as"));
    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].reason, "InvalidTarget");
    assert_eq!(events[0].message, "cluster as does not exist");
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn missing_namespace_is_reported_and_returned() {
    let h = harness(
        vec![test_cluster("as", 3, &["other"])],
        vec![],
        vec![valid_secret("gcs")],
    );
    let err = h.handler.handle(backup_request(vec![])).await.unwrap_err();

    assert!(matches!(err, Error::NamespaceNotExists { .. }));
    assert!(err.is_validation());
    let events = h.events.events();
    assert_eq!(events[0].reason, "InvalidTarget");
    assert_eq!(
        events[0].message,
        "cluster as does not contain a namespace named data"
    );
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn missing_secret_is_reported_and_returned() {
    let h = harness(vec![test_cluster("as", 3, &["data"])], vec![], vec![]);
    let err = h.handler.handle(backup_request(vec![])).await.unwrap_err();

    assert!(matches!(err, Error::SecretNotFound(ref s) if s == "gcs"));
    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "InvalidSecret");
    assert_eq!(events[0].message, "specified secret does not exist");
    assert!(h.api.created_jobs().is_empty());
}

#[tokio::test]
async fn secret_without_credentials_file_is_reported_and_returned() {
    let h = harness(
        vec![test_cluster("as", 3, &["data"])],
        vec![],
        vec![test_secret("gcs", &["credentials.json"])],
    );
    let err = h.handler.handle(backup_request(vec![])).await.unwrap_err();

    assert!(matches!(err, Error::InvalidSecretFileName { ref file, .. } if file == "key.json"));
    let events = h.events.events();
    assert_eq!(events[0].reason, "InvalidSecret");
    assert_eq!(
        events[0].message,
        "secret does not contain expected file (Expected \"key.json\")"
    );
    assert!(h.api.created_jobs().is_empty());
}

#[tokio::test]
async fn corrected_resource_converges_on_a_later_pass() -> anyhow::Result<()> {
    let broken = harness(vec![test_cluster("as", 3, &["data"])], vec![], vec![]);
    assert!(broken.handler.handle(backup_request(vec![])).await.is_err());

    // Same request once the user has created the secret.
    let fixed = valid_world();
    fixed.handler.handle(backup_request(vec![])).await?;
    assert_eq!(fixed.api.created_jobs().len(), 1);
    Ok(())
}

// ── Restore ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn restore_uses_its_own_job_name_and_status_target() -> anyhow::Result<()> {
    let restore = test_restore("recover", "as", "data", "gcs", vec![]);
    let name = job_name("restore", "recover", "recover-uid");
    let h = harness(
        vec![test_cluster("as", 3, &["data"])],
        vec![test_job(&name, Some(true))],
        vec![valid_secret("gcs")],
    );
    h.handler.handle(ConvergenceRequest::from(&restore)).await?;

    let patches = h.api.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].0, PatchTarget::AerospikeNamespaceRestore);
    assert_eq!(patches[0].2["status"]["conditions"][0]["type"], "RestoreFinished");
    Ok(())
}

#[tokio::test]
async fn backup_finished_condition_does_not_stop_a_restore() -> anyhow::Result<()> {
    let h = valid_world();
    let restore = test_restore(
        "recover",
        "as",
        "data",
        "gcs",
        vec![Condition::new("BackupFinished", ConditionStatus::True)],
    );
    h.handler.handle(ConvergenceRequest::from(&restore)).await?;

    let jobs = h.api.created_jobs();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].metadata.name.as_deref().unwrap().starts_with("recover-restore-"));
    Ok(())
}
