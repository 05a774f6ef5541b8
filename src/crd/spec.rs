//! # EncryptionMigrationController CRD
//!
//! A cluster-scoped singleton resource (conventionally named `cluster`)
//! whose `.status` carries the two conditions `ConditionReporter`
//! publishes. The component this instance governs is named by
//! `spec.component_name`, matching the selector label on its key secrets
//! (spec.md §4.4).

use serde::{Deserialize, Serialize};

#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "EncryptionMigrationController",
    group = "encryption.operator.openshift.io",
    version = "v1",
    status = "crate::crd::EncryptionMigrationControllerStatus",
    shortname = "emc",
    printcolumn = r#"{"name":"Degraded", "type":"string", "jsonPath":".status.conditions[?(@.type==\"EncryptionMigrationControllerDegraded\")].status"}, {"name":"Progressing", "type":"string", "jsonPath":".status.conditions[?(@.type==\"EncryptionMigrationControllerProgressing\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMigrationControllerSpec {
    /// Name of the component whose write keys this instance migrates,
    /// e.g. `"kube-apiserver"` or `"openshift-apiserver"`. Matches the
    /// `encryption.operator.openshift.io/component` selector label on
    /// that component's key secrets.
    pub component_name: String,
    /// GroupResources this component expects to encrypt. Compared
    /// against the component's `EncryptionProvider::encrypted_group_resources`
    /// only for observability; the provider's answer is authoritative.
    #[serde(default)]
    pub managed_resources: Vec<crate::model::GroupResource>,
}
