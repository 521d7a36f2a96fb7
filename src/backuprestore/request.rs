use std::fmt;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::api::PatchTarget;
use crate::cache::ObjectKey;
use crate::controller::helpers::controller_owner_ref;
use crate::crd::namespace_backup::AerospikeNamespaceBackup;
use crate::crd::namespace_restore::AerospikeNamespaceRestore;
use crate::crd::shared::{BackupRestoreStatus, BackupStorageSpec, Condition, TargetNamespace};
use crate::events::object_ref;
use crate::helpers::job_name;

/// What a [`ConvergenceRequest`] asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Backup,
    Restore,
}

impl Action {
    /// Lowercase label used in Job names, log fields and tool arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Backup => "backup",
            Action::Restore => "restore",
        }
    }

    pub fn started_condition_type(&self) -> &'static str {
        match self {
            Action::Backup => "BackupStarted",
            Action::Restore => "RestoreStarted",
        }
    }

    pub fn finished_condition_type(&self) -> &'static str {
        match self {
            Action::Backup => "BackupFinished",
            Action::Restore => "RestoreFinished",
        }
    }

    pub fn failed_condition_type(&self) -> &'static str {
        match self {
            Action::Backup => "BackupFailed",
            Action::Restore => "RestoreFailed",
        }
    }

    /// Status subresource receiving this action's conditions.
    pub fn patch_target(&self) -> PatchTarget {
        match self {
            Action::Backup => PatchTarget::AerospikeNamespaceBackup,
            Action::Restore => PatchTarget::AerospikeNamespaceRestore,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One backup or restore request, normalised from either custom resource so
/// the handler runs a single state machine for both.
#[derive(Clone, Debug)]
pub struct ConvergenceRequest {
    pub action: Action,
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub target: TargetNamespace,
    pub storage: BackupStorageSpec,
    pub status: BackupRestoreStatus,
    /// Event target pointing back at the originating resource.
    pub object_ref: ObjectReference,
    /// Owner reference stamped on the Job.
    pub owner_ref: OwnerReference,
}

impl ConvergenceRequest {
    fn from_resource<K: Resource<DynamicType = ()>>(
        action: Action,
        obj: &K,
        target: &TargetNamespace,
        storage: &BackupStorageSpec,
        status: Option<&BackupRestoreStatus>,
    ) -> Self {
        Self {
            action,
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
            uid: obj.uid().unwrap_or_default(),
            target: target.clone(),
            storage: storage.clone(),
            status: status.cloned().unwrap_or_default(),
            object_ref: object_ref(obj),
            owner_ref: controller_owner_ref(obj),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.status.conditions
    }

    /// Deterministic name of the Job executing this request.
    pub fn job_name(&self) -> String {
        job_name(self.action.as_str(), &self.name, &self.uid)
    }
}

impl From<&AerospikeNamespaceBackup> for ConvergenceRequest {
    fn from(obj: &AerospikeNamespaceBackup) -> Self {
        Self::from_resource(
            Action::Backup,
            obj,
            &obj.spec.target,
            &obj.spec.storage,
            obj.status.as_ref(),
        )
    }
}

impl From<&AerospikeNamespaceRestore> for ConvergenceRequest {
    fn from(obj: &AerospikeNamespaceRestore) -> Self {
        Self::from_resource(
            Action::Restore,
            obj,
            &obj.spec.target,
            &obj.spec.storage,
            obj.status.as_ref(),
        )
    }
}
