//! # StorageVersionMigration (upstream binding)
//!
//! Client-side type for the `migration.k8s.io/v1alpha1` CRD shipped by
//! Kubernetes' own storage-version-migrator. The migration controller
//! creates one of these per `(GroupResource, write key)` pair and lets
//! the in-cluster migrator reconcile it; `KubeStorageVersionMigrator`
//! (`adapters/migrator.rs`) only creates, reads and deletes these
//! objects — it never re-implements the actual re-encryption walk.

use serde::{Deserialize, Serialize};

#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "StorageVersionMigration",
    group = "migration.k8s.io",
    version = "v1alpha1",
    status = "StorageVersionMigrationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct StorageVersionMigrationSpec {
    pub resource: GroupVersionResource,
}

#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageVersionMigrationStatus {
    #[serde(default)]
    pub conditions: Vec<MigrationCondition>,
}

#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCondition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_update_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StorageVersionMigrationStatus {
    pub fn condition(&self, type_: &str) -> Option<&MigrationCondition> {
        self.conditions.iter().find(|c| c.r#type == type_)
    }
}
