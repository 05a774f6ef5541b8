//! # SecretDeployer
//!
//! Reference `Deployer` implementation: reads the rendered encryption
//! config the (out-of-scope) config-writer controller publishes as a
//! single Secret, and treats a boolean annotation on that secret as the
//! fleet-convergence signal the real deployer derives by comparing every
//! API-server replica's advertised revision (spec.md §6).

use crate::adapters::fanout::Fanout;
use crate::model::{DeployedConfig, EncryptionConfig, GroupResource, Key};
use crate::traits::Deployer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::runtime::watcher;
use kube::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

const CONVERGED_ANNOTATION: &str = "encryption.operator.openshift.io/converged";
const CONFIG_DATA_KEY: &str = "encryption-config.json";

#[derive(Debug, Serialize, Deserialize)]
struct WireEntry {
    group_resource: GroupResource,
    keys: Vec<Key>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireConfig {
    resources: Vec<WireEntry>,
}

impl From<WireConfig> for EncryptionConfig {
    fn from(wire: WireConfig) -> Self {
        let mut config = EncryptionConfig::new();
        for entry in wire.resources {
            config.resources.insert(entry.group_resource, entry.keys);
        }
        config
    }
}

pub struct SecretDeployer {
    client: Client,
    namespace: String,
    secret_name: String,
    fanout: Arc<Fanout>,
}

impl SecretDeployer {
    pub fn new(client: Client, namespace: impl Into<String>, secret_name: impl Into<String>) -> Self {
        let deployer = Self {
            client: client.clone(),
            namespace: namespace.into(),
            secret_name: secret_name.into(),
            fanout: Arc::new(Fanout::default()),
        };
        deployer.spawn_watch();
        deployer
    }

    fn spawn_watch(&self) {
        let client = self.client.clone();
        let namespace = self.namespace.clone();
        let secret_name = self.secret_name.clone();
        let fanout = self.fanout.clone();
        tokio::spawn(async move {
            let api: Api<Secret> = Api::namespaced(client, &namespace);
            let watch_config = watcher::Config::default().fields(&format!("metadata.name={secret_name}"));
            let mut stream = Box::pin(watcher(api, watch_config));
            while let Some(event) = stream.next().await {
                match event {
                    Ok(_) => fanout.notify(),
                    Err(e) => crate::runtime::error_policy::log_watch_error("deployed-encryption-config", &e),
                }
            }
        });
    }
}

#[async_trait]
impl Deployer for SecretDeployer {
    async fn deployed_encryption_config(&self) -> Result<DeployedConfig> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let secret = match api.get_opt(&self.secret_name).await.context("fetching deployed encryption config")? {
            Some(secret) => secret,
            None => return Ok(DeployedConfig { config: None, converged: false }),
        };

        let converged = secret
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(CONVERGED_ANNOTATION))
            .map(|v| v == "true")
            .unwrap_or(false);

        let config = secret
            .data
            .as_ref()
            .and_then(|d| d.get(CONFIG_DATA_KEY))
            .and_then(|bytes| serde_json::from_slice::<WireConfig>(&bytes.0).ok())
            .map(EncryptionConfig::from);

        Ok(DeployedConfig { config, converged })
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<()> {
        self.fanout.subscribe()
    }
}
