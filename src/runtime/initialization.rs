//! # Startup
//!
//! The process entry sequence: crypto provider, logging, metrics, the
//! health/metrics HTTP server, the Kubernetes client, then the sync loop
//! itself. Mirrors the layering of a typical controller's `main.rs`:
//! ambient concerns come up first so the HTTP server answers `/healthz`
//! even before the Kubernetes client has connected.

use crate::adapters::{EnvEncryptionProvider, KubeStorageVersionMigrator, SecretDeployer};
use crate::config::ControllerConfig;
use crate::controller::{ConditionReporter, MigrationDriver, SyncLoop, SyncLoopConfig};
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

pub async fn initialize(config: ControllerConfig) -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    init_tracing(&config.log_level);
    info!("starting encryption migration controller");
    info!(
        timestamp = env!("BUILD_TIMESTAMP"),
        datetime = env!("BUILD_DATETIME"),
        git_hash = env!("BUILD_GIT_HASH"),
        "build info"
    );
    crate::observability::metrics::register_metrics();

    let is_ready = Arc::new(AtomicBool::new(false));
    let server_state = Arc::new(ServerState {
        is_ready: is_ready.clone(),
    });
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(metrics_port, server_state).await {
            tracing::error!(error = %e, "HTTP server exited");
        }
    });
    wait_for_server_ready(metrics_port).await;

    let client = kube::Client::try_default()
        .await
        .context("building Kubernetes client")?;

    let group_resources = config.encrypted_group_resources.clone();
    let enabled = Arc::new(AtomicBool::new(true));
    let provider = Arc::new(EnvEncryptionProvider::new(group_resources, enabled));
    let deployer = Arc::new(SecretDeployer::new(
        client.clone(),
        config.namespace.clone(),
        "encryption-config",
    ));
    let migrator = Arc::new(KubeStorageVersionMigrator::new(client.clone()));
    let key_store = Arc::new(crate::store::KeySecretStore::new(
        client.clone(),
        config.namespace.clone(),
        config.component.clone(),
    ));

    let driver = MigrationDriver::new(key_store, deployer.clone(), migrator.clone(), provider);
    let reporter = ConditionReporter::new(client.clone());

    let loop_config = SyncLoopConfig {
        namespace: config.namespace.clone(),
        component: config.component.clone(),
        controller_name: config.controller_name.clone(),
        resync_interval: config.resync_interval(),
    };

    is_ready.store(true, std::sync::atomic::Ordering::Relaxed);
    info!(
        namespace = %config.namespace,
        component = %config.component,
        "encryption migration controller starting sync loop"
    );

    let sync_loop = SyncLoop::new(client, driver, reporter, migrator, deployer, loop_config);
    sync_loop.run().await
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn wait_for_server_ready(port: u16) {
    let addr = format!("127.0.0.1:{port}");
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(&addr).await.is_ok() {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    tracing::warn!(addr, "HTTP server did not become reachable within the startup grace period");
}
