//! # KeySecretStore
//!
//! Reads and writes the Kubernetes Secrets that carry key material and
//! their migration annotations, selected by the
//! `encryption.operator.openshift.io/component` label (spec.md §4.4).
//!
//! Secret layout, one key per secret:
//!   labels["encryption.operator.openshift.io/component"] = component name
//!   labels["encryption.operator.openshift.io/key-id"]    = decimal key id
//!   data["encryption.operator.openshift.io/mode"]        = base64(mode string)
//!   annotations["…/migrated-resources"], ["…/migrated-timestamp"]
//!
//! Role (Write/Read/Migrated/Unused) is never stored on the secret; it is
//! derived fresh every `Sync` by `StateDeriver` from the ordered key list
//! plus each key's migration annotations (spec.md §4.1). Key secrets
//! themselves are never mutated here except to CAS-update the two
//! migration annotations (spec.md §4.3); key material is owned by the
//! key-generation controller.

use crate::controller::errors::SyncError;
use crate::model::{
    compute_annotation_update, AnnotationUpdate, GroupResource, Key, KeyAnnotations, Mode, RawKeySecret,
    ANNOTATION_MIGRATED_RESOURCES, ANNOTATION_MIGRATED_TIMESTAMP,
};
use crate::traits::KeyStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;

const LABEL_COMPONENT: &str = "encryption.operator.openshift.io/component";
const LABEL_KEY_ID: &str = "encryption.operator.openshift.io/key-id";
const DATA_MODE: &str = "encryption.operator.openshift.io/mode";

const MAX_CAS_RETRIES: u32 = 5;

pub struct KeySecretStore {
    client: Client,
    namespace: String,
    component: String,
}

impl KeySecretStore {
    pub fn new(client: Client, namespace: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            component: component.into(),
        }
    }

    fn api(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Lists every key secret for this component, newest key id first.
    pub async fn list_keys(&self) -> Result<Vec<RawKeySecret>> {
        let lp = ListParams::default().labels(&format!("{LABEL_COMPONENT}={}", self.component));
        let secrets = self.api().list(&lp).await.context("listing key secrets")?;

        let mut out: Vec<RawKeySecret> = Vec::new();
        for secret in secrets.items {
            let Some(raw) = parse_raw_key(&secret) else {
                tracing::warn!(
                    secret = secret.metadata.name.as_deref().unwrap_or("?"),
                    "key secret missing required labels/data, skipping"
                );
                continue;
            };
            out.push(raw);
        }
        out.sort_by(|a, b| b.key.id.cmp(&a.key.id));
        Ok(out)
    }

    /// Applies the annotation update algorithm to the named write-key
    /// secret, retrying on resource-version conflicts (spec.md §4.3,
    /// `AnnotationConflictError` in §7).
    pub async fn mark_migrated(&self, secret_name: &str, gr: &GroupResource) -> Result<()> {
        let api = self.api();
        for attempt in 0..MAX_CAS_RETRIES {
            let secret = api
                .get(secret_name)
                .await
                .with_context(|| format!("fetching key secret {secret_name}"))?;

            let annotations = secret.metadata.annotations.clone().unwrap_or_default();
            let update = compute_annotation_update(
                annotations.get(ANNOTATION_MIGRATED_RESOURCES).map(String::as_str),
                annotations.get(ANNOTATION_MIGRATED_TIMESTAMP).map(String::as_str),
                gr,
                chrono::Utc::now(),
                Some(secret_name),
            );

            let (migrated_resources, migrated_timestamp) = match update {
                AnnotationUpdate::Unchanged => return Ok(()),
                AnnotationUpdate::Changed {
                    migrated_resources,
                    migrated_timestamp,
                } => (migrated_resources, migrated_timestamp),
            };

            let patch = serde_json::json!({
                "metadata": {
                    "resourceVersion": secret.metadata.resource_version,
                    "annotations": {
                        ANNOTATION_MIGRATED_RESOURCES: migrated_resources,
                        ANNOTATION_MIGRATED_TIMESTAMP: migrated_timestamp,
                    }
                }
            });

            match api
                .patch(
                    secret_name,
                    &PatchParams::apply("encryption-migration-controller"),
                    &Patch::Merge(patch),
                )
                .await
            {
                Ok(_) => return Ok(()),
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    let error = SyncError::AnnotationConflict {
                        secret_name: secret_name.to_string(),
                    };
                    tracing::debug!(%error, attempt, "retrying");
                    crate::observability::metrics::record_annotation_conflict();
                    continue;
                }
                Err(e) => {
                    return Err(anyhow::anyhow!(e))
                        .with_context(|| format!("patching annotations on {secret_name}"))
                }
            }
        }
        Err(anyhow::anyhow!(
            "exhausted {MAX_CAS_RETRIES} retries applying migration annotation to {secret_name}"
        ))
    }
}

/// `MigrationDriver` talks to the key-secret store only through `KeyStore`
/// (same seam pattern as `Migrator`/`Deployer` in `traits.rs`), so tests can
/// substitute an in-memory fake instead of a live cluster.
#[async_trait]
impl KeyStore for KeySecretStore {
    async fn list_keys(&self) -> Result<Vec<RawKeySecret>> {
        KeySecretStore::list_keys(self).await
    }

    async fn mark_migrated(&self, secret_name: &str, gr: &GroupResource) -> Result<()> {
        KeySecretStore::mark_migrated(self, secret_name, gr).await
    }
}

fn parse_raw_key(secret: &Secret) -> Option<RawKeySecret> {
    let labels = secret.metadata.labels.as_ref()?;
    let id: u64 = labels.get(LABEL_KEY_ID)?.parse().ok()?;
    let data = secret.data.as_ref()?;
    let mode_bytes = data.get(DATA_MODE)?;
    let mode_str = std::str::from_utf8(&mode_bytes.0).ok()?;
    let mode = match mode_str {
        "identity" => Mode::Identity,
        "aescbc" => Mode::Aescbc,
        "aesgcm" => Mode::Aesgcm,
        "secretbox" => Mode::Secretbox,
        _ => return None,
    };
    let secret_name = secret.metadata.name.clone()?;
    let annotations = secret
        .metadata
        .annotations
        .clone()
        .map(|a| KeyAnnotations::from_map(&a, Some(&secret_name)))
        .unwrap_or_default();

    Some(RawKeySecret {
        key: Key {
            id,
            secret_name,
            mode,
        },
        annotations,
    })
}
