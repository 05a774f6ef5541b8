//! # ControllerConfig
//!
//! Env-var-driven runtime configuration, following the same
//! `from_env`/default-helper pattern the rest of this codebase's ambient
//! config layer uses.

use crate::model::GroupResource;
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "openshift-config-managed";
const DEFAULT_COMPONENT: &str = "kube-apiserver";
const DEFAULT_CONTROLLER_NAME: &str = "cluster";
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_METRICS_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENCRYPTED_RESOURCES: &str = "secrets";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the component's key secrets live in.
    pub namespace: String,
    /// Selector value for `encryption.operator.openshift.io/component`.
    pub component: String,
    /// Name of the singleton `EncryptionMigrationController` resource.
    pub controller_name: String,
    pub resync_interval_secs: u64,
    pub metrics_port: u16,
    pub log_level: String,
    /// GRs this component encrypts (spec.md §6 `EncryptionProvider`).
    pub encrypted_group_resources: Vec<GroupResource>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            component: DEFAULT_COMPONENT.to_string(),
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            encrypted_group_resources: parse_group_resources(DEFAULT_ENCRYPTED_RESOURCES),
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let encrypted_resources_raw = env_var_or_default_str("EMC_ENCRYPTED_RESOURCES", DEFAULT_ENCRYPTED_RESOURCES);
        Self {
            namespace: env_var_or_default_str("EMC_NAMESPACE", &default.namespace),
            component: env_var_or_default_str("EMC_COMPONENT", &default.component),
            controller_name: env_var_or_default_str("EMC_CONTROLLER_NAME", &default.controller_name),
            resync_interval_secs: env_var_or_default("EMC_RESYNC_INTERVAL_SECS", default.resync_interval_secs),
            metrics_port: env_var_or_default("EMC_METRICS_PORT", default.metrics_port),
            log_level: env_var_or_default_str("EMC_LOG_LEVEL", &default.log_level),
            encrypted_group_resources: parse_group_resources(&encrypted_resources_raw),
        }
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

/// Comma-separated `resource` or `group/resource` entries, e.g.
/// `"secrets,apps/deployments"`. A bare name is the core group.
fn parse_group_resources(raw: &str) -> Vec<GroupResource> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once('/') {
            Some((group, resource)) => GroupResource::new(group, resource),
            None => GroupResource::new("", entry),
        })
        .collect()
}

fn env_var_or_default<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_or_default_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
