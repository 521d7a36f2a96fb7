//! aerospike-operator — Kubernetes operator for Aerospike clusters.
//!
//! The cluster, backup and restore controllers run as concurrent tokio tasks
//! within a single binary, sharing one set of watch-fed caches.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use kube::runtime::events::Reporter;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warp::Filter;

use aerospike_operator::api::KubeResourceApi;
use aerospike_operator::controller::{self, Context, Workers};
use aerospike_operator::events::KubeEventReporter;
use aerospike_operator::helpers::OperatorConfig;
use aerospike_operator::migration::InfoProbe;

#[derive(Parser, Debug)]
#[command(
    name = "aerospike-operator",
    about = "Kubernetes operator for Aerospike clusters"
)]
struct Args {
    /// Concurrent workers for AerospikeNamespaceBackup resources.
    #[arg(long, default_value_t = 2, env = "BACKUP_WORKERS")]
    backup_workers: usize,

    /// Concurrent workers for AerospikeNamespaceRestore resources.
    #[arg(long, default_value_t = 2, env = "RESTORE_WORKERS")]
    restore_workers: usize,

    /// Concurrent workers for AerospikeCluster resources.
    #[arg(long, default_value_t = 2, env = "CLUSTER_WORKERS")]
    cluster_workers: usize,

    /// Failed passes per key before it is dropped from the queue.
    #[arg(long, default_value_t = 15, env = "MAX_RETRIES")]
    max_retries: u32,

    /// How long scale-down waits for migrations on a member to finish.
    #[arg(long, default_value_t = 3600, env = "MIGRATION_TIMEOUT_SECS")]
    migration_timeout_secs: u64,

    /// Interval between two migration-status polls.
    #[arg(long, default_value_t = 5, env = "MIGRATION_POLL_SECS")]
    migration_poll_secs: u64,

    /// Image running asbackup/asrestore inside backup and restore Jobs.
    #[arg(
        long,
        default_value = "quay.io/travelaudience/aerospike-operator-tools:latest",
        env = "TOOLS_IMAGE"
    )]
    tools_image: String,

    /// Repository of the Aerospike server image; the tag is the cluster version.
    #[arg(long, default_value = "aerospike/aerospike-server", env = "AEROSPIKE_IMAGE_REPO")]
    aerospike_image_repo: String,

    /// Bind address for health probe endpoints (/healthz, /readyz).
    #[arg(long, default_value = ":8081", env = "HEALTH_PROBE_BIND_ADDRESS")]
    health_probe_bind_address: String,

    /// Log format: "text" for human-readable, "json" for structured.
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    log_format: String,
}

impl Args {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            tools_image: self.tools_image.clone(),
            aerospike_image_repo: self.aerospike_image_repo.clone(),
            migration_timeout: Duration::from_secs(self.migration_timeout_secs),
            migration_poll_interval: Duration::from_secs(self.migration_poll_secs),
            max_retries: self.max_retries,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,kube=warn,hyper=warn,tower=warn,warp=warn".into());

    if args.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // Parse health probe bind address (e.g. ":8081" or "0.0.0.0:8081").
    let health_addr: SocketAddr = args
        .health_probe_bind_address
        .strip_prefix(':')
        .map(|port| format!("0.0.0.0:{port}"))
        .unwrap_or_else(|| args.health_probe_bind_address.clone())
        .parse()
        .context("invalid --health-probe-bind-address")?;

    let client = Client::try_default().await?;
    let config = args.operator_config();

    info!(
        tools_image = %config.tools_image,
        image_repo = %config.aerospike_image_repo,
        migration_timeout = ?config.migration_timeout,
        "starting aerospike-operator"
    );

    let reporter = Reporter {
        controller: "aerospike-operator".into(),
        instance: std::env::var("POD_NAME").ok(),
    };
    let ctx = Context {
        client: client.clone(),
        config,
        api: Arc::new(KubeResourceApi::new(client.clone())),
        events: Arc::new(KubeEventReporter::new(client, reporter)),
        probe: Arc::new(InfoProbe::default()),
    };
    let workers = Workers {
        backup: args.backup_workers,
        restore: args.restore_workers,
        cluster: args.cluster_workers,
    };

    let ready = Arc::new(AtomicBool::new(false));
    let stop = CancellationToken::new();

    let healthz = warp::get()
        .and(warp::path("healthz"))
        .and(warp::path::end())
        .map(|| warp::reply::with_status("ok", warp::http::StatusCode::OK));
    let readyz = {
        let ready = Arc::clone(&ready);
        warp::get()
            .and(warp::path("readyz"))
            .and(warp::path::end())
            .map(move || {
                if ready.load(Ordering::SeqCst) {
                    warp::reply::with_status("ok", warp::http::StatusCode::OK)
                } else {
                    warp::reply::with_status(
                        "caches not synced",
                        warp::http::StatusCode::SERVICE_UNAVAILABLE,
                    )
                }
            })
    };
    let health_routes = healthz.or(readyz);
    let (_, health_server) = warp::serve(health_routes).bind_with_graceful_shutdown(health_addr, {
        let stop = stop.clone();
        async move { stop.cancelled().await }
    });
    tokio::spawn(health_server);

    tokio::spawn({
        let stop = stop.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            stop.cancel();
        }
    });

    controller::run(ctx, workers, ready, stop).await?;
    info!("aerospike-operator stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(%e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(%e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
