use std::sync::Arc;

use tracing::debug;

use crate::backuprestore::{BackupRestoreHandler, ConvergenceRequest};
use crate::cache::{ObjectKey, ResourceCache};
use crate::crd::namespace_backup::AerospikeNamespaceBackup;
use crate::error::Result;

use super::generic::SyncHandler;

pub const CONTROLLER_NAME: &str = "aerospikenamespacebackup";

/// Looks up AerospikeNamespaceBackup keys and runs them through the shared
/// backup/restore handler.
pub struct BackupSync {
    backups: ResourceCache<AerospikeNamespaceBackup>,
    handler: Arc<BackupRestoreHandler>,
}

impl BackupSync {
    pub fn new(
        backups: ResourceCache<AerospikeNamespaceBackup>,
        handler: Arc<BackupRestoreHandler>,
    ) -> Self {
        Self { backups, handler }
    }
}

#[async_trait::async_trait]
impl SyncHandler for BackupSync {
    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let Some(backup) = self.backups.get_key(key) else {
            debug!(%key, "aerospikenamespacebackup in work queue no longer exists");
            return Ok(());
        };
        self.handler
            .handle(ConvergenceRequest::from(backup.as_ref()))
            .await
    }
}
