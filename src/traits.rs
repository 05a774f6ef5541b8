//! # External collaborator contracts
//!
//! The Migrator, Deployer and EncryptionProvider interfaces consumed by
//! `MigrationDriver` (spec.md §6). These are the seams across which the
//! key-generation controller, the config-writer, the deployer and the
//! physical storage-migration worker are reached — never called
//! directly, only through these traits (spec.md §9, "never direct
//! inter-controller calls").

use crate::model::{DeployedConfig, GroupResource, RawKeySecret};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Outcome of one `EnsureMigration` call, the `(finished, lastResult,
/// lastAt)` triple from spec.md §6. A transport/internal error is instead
/// surfaced through the `Result::Err` arm of the trait method
/// (`MigratorError` in spec.md §7); `last_result` here corresponds only
/// to a terminal-looking failure report from a *completed* run
/// (`MigratorFailure`).
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub finished: bool,
    pub last_result: Option<String>,
    pub last_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    pub fn in_progress() -> Self {
        Self {
            finished: false,
            last_result: None,
            last_at: None,
        }
    }

    pub fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            finished: true,
            last_result: None,
            last_at: Some(at),
        }
    }

    pub fn failed(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            finished: true,
            last_result: Some(message.into()),
            last_at: Some(at),
        }
    }
}

/// Executes online re-encryption for one resource against a specified
/// write key; idempotent per `(gr, write_key_name)` pair (spec.md §6).
#[async_trait]
pub trait Migrator: Send + Sync {
    async fn ensure_migration(
        &self,
        gr: &GroupResource,
        write_key_name: &str,
    ) -> anyhow::Result<MigrationStatus>;

    /// Cancels and discards any in-flight work for a GR. Must be safe to
    /// call when nothing is running (spec.md §5) — cancellation is
    /// best-effort and its errors are logged, never surfaced.
    async fn prune_migration(&self, gr: &GroupResource) -> anyhow::Result<()>;

    /// An informer-like subscription that wakes the `SyncLoop` promptly
    /// on migration progress. Each call returns a fresh receiver; the
    /// Migrator is expected to fan its internal progress notifications
    /// out to every outstanding subscriber.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<()>;
}

/// Reports the single revision on which all API-server replicas have
/// converged, plus its encryption config (spec.md §6).
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deployed_encryption_config(&self) -> anyhow::Result<DeployedConfig>;

    /// Wakes the `SyncLoop` when the deployer's own view changes (new
    /// revision observed, convergence achieved or lost).
    fn subscribe(&self) -> mpsc::UnboundedReceiver<()>;
}

/// Reads and writes the component's key secrets (spec.md §4.4). The live
/// implementation is `store::KeySecretStore`; tests substitute an
/// in-memory fake so `MigrationDriver` never needs a real cluster.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn list_keys(&self) -> anyhow::Result<Vec<RawKeySecret>>;
    async fn mark_migrated(&self, secret_name: &str, gr: &GroupResource) -> anyhow::Result<()>;
}

/// The component's encryption preferences and the global enable switch
/// (spec.md §6). Modeled as an injected predicate rather than
/// process-wide state so toggling propagates without a restart
/// (spec.md §9).
#[async_trait]
pub trait EncryptionProvider: Send + Sync {
    fn encrypted_group_resources(&self) -> Vec<GroupResource>;
    async fn should_run_encryption_controllers(&self) -> anyhow::Result<bool>;
}
