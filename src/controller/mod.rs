//! Controller wiring.
//!
//! One watch per resource kind feeds a shared cache and routes change
//! notifications to the controllers interested in them:
//!
//! | watch                       | notifies                                |
//! |-----------------------------|-----------------------------------------|
//! | AerospikeNamespaceBackup    | backup controller (own key)             |
//! | AerospikeNamespaceRestore   | restore controller (own key)            |
//! | AerospikeCluster            | cluster controller (own key)            |
//! | Job (tools jobs)            | backup / restore controller (owner key) |
//! | Pod (cluster members)       | cluster controller (`cluster` label)    |
//! | Secret                      | nobody; cache only                      |

pub mod backup;
pub mod cluster;
pub mod generic;
pub mod helpers;
pub mod restore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::try_join_all;
use k8s_openapi::api::{
    batch::v1::Job,
    core::v1::{Pod, Secret},
};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::ResourceApi;
use crate::backuprestore::BackupRestoreHandler;
use crate::cache::{controller_owner_key, own_key, Informer};
use crate::crd::aerospike_cluster::AerospikeCluster;
use crate::crd::namespace_backup::AerospikeNamespaceBackup;
use crate::crd::namespace_restore::AerospikeNamespaceRestore;
use crate::error::Result;
use crate::events::EventReporter;
use crate::helpers::OperatorConfig;
use crate::migration::MigrationProbe;
use crate::queue::ExponentialBackoff;
use crate::reconciler::{ClusterReconciler, NodeLifecycleManager};

use self::generic::Controller;
use self::helpers::{LABEL_APP_KEY, LABEL_APP_VAL};

// ── Shared context ──────────────────────────────────────────────────────────

pub struct Context {
    pub client: Client,
    pub config: OperatorConfig,
    pub api: Arc<dyn ResourceApi>,
    pub events: Arc<dyn EventReporter>,
    pub probe: Arc<dyn MigrationProbe>,
}

/// Worker count per controller.
#[derive(Clone, Copy, Debug)]
pub struct Workers {
    pub backup: usize,
    pub restore: usize,
    pub cluster: usize,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            backup: 2,
            restore: 2,
            cluster: 2,
        }
    }
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Start every watch and controller and run until `stop` is cancelled.
/// `ready` flips to true once every cache has received its initial list.
pub async fn run(
    ctx: Context,
    workers: Workers,
    ready: Arc<AtomicBool>,
    stop: CancellationToken,
) -> Result<()> {
    let client = ctx.client.clone();
    let cfg = &ctx.config;

    let (backup_tx, backup_rx) = mpsc::unbounded_channel();
    let (restore_tx, restore_rx) = mpsc::unbounded_channel();
    let (cluster_tx, cluster_rx) = mpsc::unbounded_channel();

    let (backups, backups_watch) = Informer::new(
        Api::<AerospikeNamespaceBackup>::all(client.clone()),
        WatcherConfig::default(),
    )
    .notify(backup_tx.clone(), own_key)
    .run();

    let (restores, restores_watch) = Informer::new(
        Api::<AerospikeNamespaceRestore>::all(client.clone()),
        WatcherConfig::default(),
    )
    .notify(restore_tx.clone(), own_key)
    .run();

    let (clusters, clusters_watch) = Informer::new(
        Api::<AerospikeCluster>::all(client.clone()),
        WatcherConfig::default(),
    )
    .notify(cluster_tx.clone(), own_key)
    .run();

    let (jobs, jobs_watch) = Informer::new(Api::<Job>::all(client.clone()), WatcherConfig::default())
        .notify(backup_tx, controller_owner_key::<Job, AerospikeNamespaceBackup>)
        .notify(restore_tx, controller_owner_key::<Job, AerospikeNamespaceRestore>)
        .run();

    let (secrets, secrets_watch) =
        Informer::new(Api::<Secret>::all(client.clone()), WatcherConfig::default()).run();

    let (pods, pods_watch) = Informer::new(
        Api::<Pod>::all(client.clone()),
        WatcherConfig::default().labels(&format!("{LABEL_APP_KEY}={LABEL_APP_VAL}")),
    )
    .notify(cluster_tx, cluster::pod_cluster_key)
    .run();

    let watches = [
        backups_watch,
        restores_watch,
        clusters_watch,
        jobs_watch,
        secrets_watch,
        pods_watch,
    ]
    .into_iter()
    .map(tokio::spawn)
    .collect::<Vec<_>>();

    // Readiness: every cache has its initial list.
    {
        let (backups, restores, clusters) = (backups.clone(), restores.clone(), clusters.clone());
        let (jobs, secrets, pods) = (jobs.clone(), secrets.clone(), pods.clone());
        let ready = Arc::clone(&ready);
        tokio::spawn(async move {
            let synced = tokio::try_join!(
                backups.wait_until_ready(),
                restores.wait_until_ready(),
                clusters.wait_until_ready(),
                jobs.wait_until_ready(),
                secrets.wait_until_ready(),
                pods.wait_until_ready(),
            );
            if synced.is_ok() {
                info!("all caches synced");
                ready.store(true, Ordering::SeqCst);
            }
        });
    }

    let backoff = ExponentialBackoff::new(cfg.backoff_base, cfg.backoff_max);

    let handler = Arc::new(BackupRestoreHandler::new(
        Arc::clone(&ctx.api),
        Arc::clone(&ctx.events),
        clusters.clone(),
        jobs.clone(),
        secrets.clone(),
        cfg.tools_image.clone(),
    ));

    let backup_controller = Controller::new(
        backup::CONTROLLER_NAME,
        Arc::new(backup::BackupSync::new(backups.clone(), Arc::clone(&handler))),
        backup_rx,
        backoff,
        cfg.max_retries,
    )
    .wait_for(&backups)
    .wait_for(&clusters)
    .wait_for(&jobs)
    .wait_for(&secrets);

    let restore_controller = Controller::new(
        restore::CONTROLLER_NAME,
        Arc::new(restore::RestoreSync::new(restores.clone(), handler)),
        restore_rx,
        backoff,
        cfg.max_retries,
    )
    .wait_for(&restores)
    .wait_for(&clusters)
    .wait_for(&jobs)
    .wait_for(&secrets);

    let lifecycle = NodeLifecycleManager::new(
        Arc::clone(&ctx.api),
        Arc::clone(&ctx.events),
        Arc::clone(&ctx.probe),
        cfg.aerospike_image_repo.clone(),
        cfg.migration_timeout,
        cfg.migration_poll_interval,
    );
    let reconciler = Arc::new(ClusterReconciler::new(
        Arc::clone(&ctx.api),
        pods.clone(),
        lifecycle,
    ));
    let cluster_controller = Controller::new(
        cluster::CONTROLLER_NAME,
        Arc::new(cluster::ClusterSync::new(clusters.clone(), reconciler)),
        cluster_rx,
        backoff,
        cfg.max_retries,
    )
    .wait_for(&clusters)
    .wait_for(&pods);

    let result = try_join_all([
        tokio::spawn(backup_controller.run(workers.backup, stop.clone())),
        tokio::spawn(restore_controller.run(workers.restore, stop.clone())),
        tokio::spawn(cluster_controller.run(workers.cluster, stop.clone())),
    ])
    .await;

    for watch in watches {
        watch.abort();
    }

    result?.into_iter().collect()
}
