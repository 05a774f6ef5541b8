//! # SyncLoop
//!
//! Periodic and event-driven re-entry point; debounces via a work queue
//! (spec.md §4.6). Wakeups come from five sources: key-secret changes,
//! operator-status changes (including a `ctl sync` trigger annotation), a
//! fixed resync interval, the deployer's own change signal, and the
//! migrator's progress notifications — collapsed into one channel so
//! `Sync` never runs concurrently with itself (spec.md §5).

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::condition_reporter::ConditionReporter;
use crate::controller::errors::SyncError;
use crate::controller::migration_driver::{MigrationDriver, SyncOutcome};
use crate::crd::EncryptionMigrationController;
use crate::traits::{Deployer, Migrator};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::runtime::watcher;
use kube::Client;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct SyncLoopConfig {
    pub namespace: String,
    pub component: String,
    /// Name of the singleton `EncryptionMigrationController` this loop
    /// reports status on.
    pub controller_name: String,
    pub resync_interval: Duration,
}

pub struct SyncLoop {
    client: Client,
    driver: MigrationDriver,
    reporter: ConditionReporter,
    migrator: Arc<dyn Migrator>,
    deployer: Arc<dyn Deployer>,
    config: SyncLoopConfig,
}

impl SyncLoop {
    pub fn new(
        client: Client,
        driver: MigrationDriver,
        reporter: ConditionReporter,
        migrator: Arc<dyn Migrator>,
        deployer: Arc<dyn Deployer>,
        config: SyncLoopConfig,
    ) -> Self {
        Self {
            client,
            driver,
            reporter,
            migrator,
            deployer,
            config,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        self.spawn_secret_watch(tx.clone());
        self.spawn_controller_status_watch(tx.clone());
        self.spawn_resync_ticker(tx.clone());
        self.spawn_subscription_forwarder(self.migrator.subscribe(), tx.clone());
        self.spawn_subscription_forwarder(self.deployer.subscribe(), tx.clone());
        drop(tx);

        let mut error_backoff = FibonacciBackoff::new(1, 60);
        let mut pending_requeue: Option<Pin<Box<tokio::time::Sleep>>> = None;

        loop {
            tokio::select! {
                wake = rx.recv() => {
                    match wake {
                        Some(()) => {
                            // Debounce: a burst of wakeups collapses into
                            // a single Sync, per the work-queue model.
                            while rx.try_recv().is_ok() {}
                        }
                        None => break,
                    }
                }
                _ = Self::wait_pending(&mut pending_requeue) => {
                    pending_requeue = None;
                }
            }

            let started = std::time::Instant::now();
            let result = self.driver.sync().await;
            crate::observability::metrics::record_sync(started.elapsed(), result.is_err());

            match result {
                Ok(outcome) => {
                    error_backoff.reset();
                    if let SyncOutcome::Requeued { after } = &outcome {
                        pending_requeue = Some(Box::pin(tokio::time::sleep(*after)));
                    }
                    if let Err(e) = self.reporter.report(&self.config.controller_name, &outcome).await {
                        let error = SyncError::StatusUpdateFailure(e);
                        tracing::warn!(%error, "will retry");
                        pending_requeue = Some(Box::pin(tokio::time::sleep(error_backoff.next_backoff())));
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "sync failed");
                    pending_requeue = Some(Box::pin(tokio::time::sleep(error_backoff.next_backoff())));
                }
            }
        }

        Ok(())
    }

    async fn wait_pending(pending: &mut Option<Pin<Box<tokio::time::Sleep>>>) {
        match pending {
            Some(sleep) => sleep.await,
            None => futures::future::pending::<()>().await,
        }
    }

    fn spawn_secret_watch(&self, tx: mpsc::UnboundedSender<()>) {
        let client = self.client.clone();
        let namespace = self.config.namespace.clone();
        let component = self.config.component.clone();
        tokio::spawn(async move {
            let api: Api<Secret> = Api::namespaced(client, &namespace);
            let watch_config = watcher::Config::default()
                .labels(&format!("encryption.operator.openshift.io/component={component}"));
            let mut stream = Box::pin(watcher(api, watch_config));
            while let Some(event) = stream.next().await {
                match event {
                    Ok(_) => {
                        if tx.send(()).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::runtime::error_policy::log_watch_error("key-secret", &e),
                }
            }
        });
    }

    fn spawn_controller_status_watch(&self, tx: mpsc::UnboundedSender<()>) {
        let client = self.client.clone();
        let name = self.config.controller_name.clone();
        tokio::spawn(async move {
            let api: Api<EncryptionMigrationController> = Api::all(client);
            let watch_config = watcher::Config::default().fields(&format!("metadata.name={name}"));
            let mut stream = Box::pin(watcher(api, watch_config));
            while let Some(event) = stream.next().await {
                match event {
                    Ok(_) => {
                        if tx.send(()).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::runtime::error_policy::log_watch_error("controller-status", &e),
                }
            }
        });
    }

    fn spawn_resync_ticker(&self, tx: mpsc::UnboundedSender<()>) {
        let interval = self.config.resync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
    }

    fn spawn_subscription_forwarder(&self, mut sub: mpsc::UnboundedReceiver<()>, tx: mpsc::UnboundedSender<()>) {
        tokio::spawn(async move {
            while sub.recv().await.is_some() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
    }
}
