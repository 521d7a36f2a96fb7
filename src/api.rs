//! Write side of the Kubernetes API, as consumed by the reconcilers.
//!
//! Reads always go through [`crate::cache`]; everything that mutates the
//! cluster goes through [`ResourceApi`] so tests can substitute a recorder.

use k8s_openapi::api::{
    batch::v1::Job,
    core::v1::{Pod, Service},
};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::Value;

use crate::crd::aerospike_cluster::AerospikeCluster;
use crate::crd::namespace_backup::AerospikeNamespaceBackup;
use crate::crd::namespace_restore::AerospikeNamespaceRestore;
use crate::error::Result;

/// Field manager name recorded on every write.
pub const FIELD_MANAGER: &str = "aerospike-operator";

/// Resource kinds whose status subresource the operator patches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchTarget {
    AerospikeCluster,
    AerospikeNamespaceBackup,
    AerospikeNamespaceRestore,
}

/// Trait abstracting Kubernetes writes so tests can substitute a recorder.
#[async_trait::async_trait]
pub trait ResourceApi: Send + Sync {
    async fn create_job(&self, ns: &str, job: &Job) -> Result<Job>;

    async fn create_pod(&self, ns: &str, pod: &Pod) -> Result<Pod>;

    async fn delete_pod(&self, ns: &str, name: &str) -> Result<()>;

    async fn create_service(&self, ns: &str, service: &Service) -> Result<Service>;

    /// Apply a JSON merge patch to the status subresource of `target`.
    async fn merge_patch_status(
        &self,
        target: PatchTarget,
        ns: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()>;
}

/// Production implementation backed by a kube [`Client`].
pub struct KubeResourceApi {
    client: Client,
}

impl KubeResourceApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn patch_status<K>(&self, ns: &str, name: &str, patch: &Value) -> Result<()>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), ns);
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(patch),
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceApi for KubeResourceApi {
    async fn create_job(&self, ns: &str, job: &Job) -> Result<Job> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), ns);
        Ok(api.create(&PostParams::default(), job).await?)
    }

    async fn create_pod(&self, ns: &str, pod: &Pod) -> Result<Pod> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), ns);
        Ok(api.create(&PostParams::default(), pod).await?)
    }

    async fn delete_pod(&self, ns: &str, name: &str) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), ns);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn create_service(&self, ns: &str, service: &Service) -> Result<Service> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), ns);
        Ok(api.create(&PostParams::default(), service).await?)
    }

    async fn merge_patch_status(
        &self,
        target: PatchTarget,
        ns: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()> {
        match target {
            PatchTarget::AerospikeCluster => {
                self.patch_status::<AerospikeCluster>(ns, name, patch).await
            }
            PatchTarget::AerospikeNamespaceBackup => {
                self.patch_status::<AerospikeNamespaceBackup>(ns, name, patch)
                    .await
            }
            PatchTarget::AerospikeNamespaceRestore => {
                self.patch_status::<AerospikeNamespaceRestore>(ns, name, patch)
                    .await
            }
        }
    }
}
