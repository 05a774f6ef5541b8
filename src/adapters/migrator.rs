//! # KubeStorageVersionMigrator
//!
//! Reference `Migrator` implementation built on Kubernetes' own
//! `migration.k8s.io` storage-version-migrator: `ensure_migration` creates
//! or reads a `StorageVersionMigration` object per `(gr, writeKeyName)`
//! pair and translates its conditions into the `(finished, lastResult,
//! lastAt)` triple (spec.md §6); the actual object-by-object re-encryption
//! walk is performed by that upstream controller, not here.

use crate::adapters::fanout::Fanout;
use crate::crd::{GroupVersionResource, StorageVersionMigration, StorageVersionMigrationSpec};
use crate::model::GroupResource;
use crate::traits::{MigrationStatus, Migrator};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::runtime::watcher;
use kube::Client;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct KubeStorageVersionMigrator {
    client: Client,
    fanout: Arc<Fanout>,
}

impl KubeStorageVersionMigrator {
    pub fn new(client: Client) -> Self {
        let migrator = Self {
            client: client.clone(),
            fanout: Arc::new(Fanout::default()),
        };
        migrator.spawn_watch();
        migrator
    }

    fn spawn_watch(&self) {
        let client = self.client.clone();
        let fanout = self.fanout.clone();
        tokio::spawn(async move {
            let api: Api<StorageVersionMigration> = Api::all(client);
            let mut stream = Box::pin(watcher(api, watcher::Config::default()));
            while let Some(event) = stream.next().await {
                match event {
                    Ok(_) => fanout.notify(),
                    Err(e) => crate::runtime::error_policy::log_watch_error("storage-version-migration", &e),
                }
            }
        });
    }

    fn api(&self) -> Api<StorageVersionMigration> {
        Api::all(self.client.clone())
    }
}

fn object_name(gr: &GroupResource, write_key_name: &str) -> String {
    let group = if gr.group.is_empty() { "core" } else { &gr.group };
    format!(
        "encryption-migrate-{group}-{}-{write_key_name}",
        gr.resource
    )
    .replace('.', "-")
    .to_lowercase()
}

#[async_trait]
impl Migrator for KubeStorageVersionMigrator {
    async fn ensure_migration(&self, gr: &GroupResource, write_key_name: &str) -> Result<MigrationStatus> {
        let name = object_name(gr, write_key_name);
        let api = self.api();

        let existing = api.get_opt(&name).await.context("fetching StorageVersionMigration")?;
        let svm = match existing {
            Some(svm) => svm,
            None => {
                let svm = StorageVersionMigration {
                    metadata: ObjectMeta {
                        name: Some(name.clone()),
                        ..Default::default()
                    },
                    spec: StorageVersionMigrationSpec {
                        resource: GroupVersionResource {
                            group: gr.group.clone(),
                            version: "v1".to_string(),
                            resource: gr.resource.clone(),
                        },
                    },
                    status: None,
                };
                api.create(&PostParams::default(), &svm)
                    .await
                    .context("creating StorageVersionMigration")?
            }
        };

        let Some(status) = svm.status.as_ref() else {
            return Ok(MigrationStatus::in_progress());
        };

        if let Some(succeeded) = status.condition("Succeeded") {
            if succeeded.status == "True" {
                let at = parse_time(succeeded.last_update_time.as_deref());
                return Ok(MigrationStatus::succeeded(at));
            }
        }
        if let Some(failed) = status.condition("Failed") {
            if failed.status == "True" {
                let at = parse_time(failed.last_update_time.as_deref());
                let message = failed.message.clone().unwrap_or_else(|| "migration failed".to_string());
                return Ok(MigrationStatus::failed(message, at));
            }
        }

        Ok(MigrationStatus::in_progress())
    }

    async fn prune_migration(&self, gr: &GroupResource) -> Result<()> {
        // We don't know the write key here (spec.md §5: cancellation is
        // best-effort); delete every migration object for this GR rather
        // than trying to reconstruct the exact name.
        let prefix = object_name(gr, "");
        let api = self.api();
        let list = api.list(&Default::default()).await.context("listing StorageVersionMigrations")?;
        for item in list.items {
            let Some(name) = item.metadata.name.clone() else { continue };
            if name.starts_with(&prefix) {
                if let Err(e) = api.delete(&name, &Default::default()).await {
                    if !matches!(&e, kube::Error::Api(api_err) if api_err.code == 404) {
                        tracing::warn!(name, error = %e, "failed to delete StorageVersionMigration during prune");
                    }
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<()> {
        self.fanout.subscribe()
    }
}

fn parse_time(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|r| DateTime::parse_from_rfc3339(r).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
