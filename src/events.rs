//! User-visible diagnostic events.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event as KubeEvent, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use tracing::warn;

pub const REASON_INVALID_TARGET: &str = "InvalidTarget";
pub const REASON_INVALID_SECRET: &str = "InvalidSecret";
pub const REASON_JOB_CREATED: &str = "JobCreated";
pub const REASON_JOB_FAILED: &str = "JobFailed";
pub const REASON_MIGRATION_TIMEOUT: &str = "MigrationTimeout";
pub const REASON_MEMBER_CREATED: &str = "MemberCreated";
pub const REASON_MEMBER_REMOVED: &str = "MemberRemoved";

/// Severity of a recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

impl From<Severity> for EventType {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Normal => EventType::Normal,
            Severity::Warning => EventType::Warning,
        }
    }
}

/// Build an ObjectReference from any kube Resource.
pub fn object_ref<K: Resource<DynamicType = ()>>(obj: &K) -> ObjectReference {
    ObjectReference {
        api_version: Some(K::api_version(&()).to_string()),
        kind: Some(K::kind(&()).to_string()),
        name: Some(obj.name_any()),
        namespace: obj.namespace(),
        uid: obj.meta().uid.clone(),
        resource_version: obj.meta().resource_version.clone(),
        ..Default::default()
    }
}

/// Trait abstracting event publication so tests can capture events.
/// Implementations must never fail a reconcile pass.
#[async_trait::async_trait]
pub trait EventReporter: Send + Sync {
    async fn record(
        &self,
        target: &ObjectReference,
        severity: Severity,
        reason: &str,
        message: String,
    );
}

/// Production implementation publishing `events.k8s.io` events.
pub struct KubeEventReporter {
    recorder: Recorder,
}

impl KubeEventReporter {
    pub fn new(client: Client, reporter: Reporter) -> Self {
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait::async_trait]
impl EventReporter for KubeEventReporter {
    async fn record(
        &self,
        target: &ObjectReference,
        severity: Severity,
        reason: &str,
        message: String,
    ) {
        let event = KubeEvent {
            type_: severity.into(),
            reason: reason.to_string(),
            note: Some(message),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, target).await {
            warn!(%e, %reason, "failed to publish event");
        }
    }
}
