use std::sync::Arc;

use tracing::debug;

use crate::backuprestore::{BackupRestoreHandler, ConvergenceRequest};
use crate::cache::{ObjectKey, ResourceCache};
use crate::crd::namespace_restore::AerospikeNamespaceRestore;
use crate::error::Result;

use super::generic::SyncHandler;

pub const CONTROLLER_NAME: &str = "aerospikenamespacerestore";

/// Looks up AerospikeNamespaceRestore keys and runs them through the shared
/// backup/restore handler.
pub struct RestoreSync {
    restores: ResourceCache<AerospikeNamespaceRestore>,
    handler: Arc<BackupRestoreHandler>,
}

impl RestoreSync {
    pub fn new(
        restores: ResourceCache<AerospikeNamespaceRestore>,
        handler: Arc<BackupRestoreHandler>,
    ) -> Self {
        Self { restores, handler }
    }
}

#[async_trait::async_trait]
impl SyncHandler for RestoreSync {
    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let Some(restore) = self.restores.get_key(key) else {
            debug!(%key, "aerospikenamespacerestore in work queue no longer exists");
            return Ok(());
        };
        self.handler
            .handle(ConvergenceRequest::from(restore.as_ref()))
            .await
    }
}
