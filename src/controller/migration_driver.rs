//! # MigrationDriver
//!
//! The controller body: gates on revision stability, iterates resources,
//! starts/reaps migrations, stamps secrets (spec.md §4.2 — "the hard
//! part").

use crate::controller::errors::SyncError;
use crate::model::GroupResource;
use crate::state::StateDeriver;
use crate::traits::{Deployer, EncryptionProvider, KeyStore, Migrator};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Gap between a reported failure and reconsidering it (spec.md §4.2 step
/// 4c, the retry-after-failure policy).
pub const RETRY_AFTER: Duration = Duration::from_secs(5 * 60);
/// Delay used to re-queue when the fleet is mid-rollout or the config has
/// diverged (spec.md §4.2 steps 2 and 3).
pub const TRANSITIONAL_REQUEUE: Duration = Duration::from_secs(2 * 60);

/// What one `Sync` call decided, handed to `ConditionReporter`.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Preconditions failed; emit no conditions at all (spec.md §4.2 step 1).
    Suppressed,
    /// Mid-rollout or config diverged; re-queue after `after`, no condition
    /// change beyond what the caller already holds.
    Requeued { after: Duration },
    /// A full gating+migration pass ran to completion.
    Completed {
        degraded: Option<String>,
        progressing: Vec<GroupResource>,
    },
}

pub struct MigrationDriver {
    key_store: Arc<dyn KeyStore>,
    deployer: Arc<dyn Deployer>,
    migrator: Arc<dyn Migrator>,
    provider: Arc<dyn EncryptionProvider>,
}

impl MigrationDriver {
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        deployer: Arc<dyn Deployer>,
        migrator: Arc<dyn Migrator>,
        provider: Arc<dyn EncryptionProvider>,
    ) -> Self {
        Self {
            key_store,
            deployer,
            migrator,
            provider,
        }
    }

    /// Idempotent; may be re-entered at any cadence (spec.md §4.2).
    pub async fn sync(&self) -> anyhow::Result<SyncOutcome> {
        if !self.provider.should_run_encryption_controllers().await? {
            return Ok(SyncOutcome::Suppressed);
        }

        let raw_keys = self.key_store.list_keys().await?;
        let deployed = self.deployer.deployed_encryption_config().await?;
        let encrypted_grs = self.provider.encrypted_group_resources();

        let derived = StateDeriver::derive(&deployed, &raw_keys, &encrypted_grs);

        if derived.current_config.is_none() || derived.transitional_reason.is_some() {
            if let Some(reason) = &derived.transitional_reason {
                let error = SyncError::Transitional(reason.clone());
                tracing::debug!(%error, "sync deferred");
            }
            return Ok(SyncOutcome::Requeued {
                after: TRANSITIONAL_REQUEUE,
            });
        }
        let current_config = derived.current_config.as_ref().unwrap();

        if !current_config.provider_lists_equal(&derived.desired_config) {
            let error = SyncError::ConfigDiverged;
            tracing::debug!(%error, "sync deferred");
            for gr in derived.desired_state.keys() {
                if let Err(e) = self.migrator.prune_migration(gr).await {
                    tracing::warn!(%gr, error = %e, "best-effort migration cancellation failed");
                }
            }
            return Ok(SyncOutcome::Requeued {
                after: TRANSITIONAL_REQUEUE,
            });
        }

        let mut errors: Vec<SyncError> = Vec::new();
        let mut migrating: Vec<GroupResource> = Vec::new();

        // `desired_state` is a BTreeMap keyed by GroupResource, whose Ord
        // is lexicographic on `group/resource` — iteration order here is
        // already the deterministic order spec.md §4.2 step 4 requires.
        for (gr, actual) in &derived.desired_state {
            let Some(write_key) = actual.write_key() else {
                continue;
            };

            let already_migrated = raw_keys
                .iter()
                .find(|r| r.key.secret_name == write_key.secret_name)
                .is_some_and(|r| r.annotations.migrated_resources.contains(gr));
            if already_migrated {
                continue;
            }

            crate::observability::metrics::record_migration_started(&gr.human());
            match self.try_migrate(gr, &write_key.secret_name).await {
                Ok(Some(())) => {
                    if let Err(e) = self.key_store.mark_migrated(&write_key.secret_name, gr).await {
                        errors.push(SyncError::MigratorError { gr: gr.clone(), source: e });
                    } else {
                        crate::observability::metrics::record_migration_completed(&gr.human());
                    }
                }
                Ok(None) => migrating.push(gr.clone()),
                Err(e) => errors.push(e),
            }
        }

        crate::observability::metrics::set_resources_progressing(migrating.len() as i64);

        let degraded = if errors.is_empty() {
            None
        } else {
            Some(errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))
        };

        Ok(SyncOutcome::Completed {
            degraded,
            progressing: migrating,
        })
    }

    /// Runs one `EnsureMigration` attempt for `gr`, applying the
    /// retry-after-failure cooldown (spec.md §4.2 step 4c). Returns
    /// `Ok(Some(()))` on a success ready to annotate, `Ok(None)` if still
    /// migrating, `Err` for a surfaced `MigratorFailure`/`MigratorError`.
    async fn try_migrate(&self, gr: &GroupResource, write_key_name: &str) -> Result<Option<()>, SyncError> {
        let status = self
            .migrator
            .ensure_migration(gr, write_key_name)
            .await
            .map_err(|source| SyncError::MigratorError { gr: gr.clone(), source })?;

        if !status.finished {
            return Ok(None);
        }
        let Some(last_result) = &status.last_result else {
            return Ok(Some(()));
        };

        let age = status
            .last_at
            .map(|at| Utc::now().signed_duration_since(at))
            .unwrap_or_default();
        if age > chrono::Duration::from_std(RETRY_AFTER).unwrap() {
            if let Err(e) = self.migrator.prune_migration(gr).await {
                tracing::warn!(%gr, error = %e, "best-effort prune before retry failed");
            }
            let retried = self
                .migrator
                .ensure_migration(gr, write_key_name)
                .await
                .map_err(|source| SyncError::MigratorError { gr: gr.clone(), source })?;
            return match retried.last_result {
                None if retried.finished => Ok(Some(())),
                None => Ok(None),
                Some(message) => Err(SyncError::MigratorFailure { gr: gr.clone(), message }),
            };
        }

        Err(SyncError::MigratorFailure {
            gr: gr.clone(),
            message: last_result.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeployedConfig, EncryptionConfig, Key, KeyAnnotations, Mode, RawKeySecret};
    use crate::traits::MigrationStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn key(id: u64) -> Key {
        Key {
            id,
            secret_name: format!("encryption-key-{id}"),
            mode: Mode::Aesgcm,
        }
    }

    fn raw(id: u64) -> RawKeySecret {
        RawKeySecret {
            key: key(id),
            annotations: KeyAnnotations::default(),
        }
    }

    struct FakeKeyStore {
        keys: Mutex<Vec<RawKeySecret>>,
        marked: Mutex<Vec<(String, GroupResource)>>,
    }

    impl FakeKeyStore {
        fn new(keys: Vec<RawKeySecret>) -> Self {
            Self {
                keys: Mutex::new(keys),
                marked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl KeyStore for FakeKeyStore {
        async fn list_keys(&self) -> anyhow::Result<Vec<RawKeySecret>> {
            Ok(self.keys.lock().unwrap().clone())
        }

        async fn mark_migrated(&self, secret_name: &str, gr: &GroupResource) -> anyhow::Result<()> {
            self.marked.lock().unwrap().push((secret_name.to_string(), gr.clone()));
            for raw in self.keys.lock().unwrap().iter_mut() {
                if raw.key.secret_name == secret_name {
                    raw.annotations.migrated_resources.insert(gr.clone());
                }
            }
            Ok(())
        }
    }

    struct FakeDeployer {
        deployed: DeployedConfig,
    }

    #[async_trait]
    impl Deployer for FakeDeployer {
        async fn deployed_encryption_config(&self) -> anyhow::Result<DeployedConfig> {
            Ok(self.deployed.clone())
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<()> {
            mpsc::unbounded_channel().1
        }
    }

    #[derive(Default)]
    struct FakeMigrator {
        /// Per-GR queue of responses; each `ensure_migration` call pops the
        /// front (repeating the last entry once exhausted).
        responses: Mutex<HashMap<String, Vec<MigrationStatus>>>,
        ensure_calls: Mutex<Vec<GroupResource>>,
        prune_calls: Mutex<Vec<GroupResource>>,
    }

    impl FakeMigrator {
        fn with(gr: &GroupResource, statuses: Vec<MigrationStatus>) -> Self {
            let m = Self::default();
            m.responses.lock().unwrap().insert(gr.human(), statuses);
            m
        }
    }

    #[async_trait]
    impl Migrator for FakeMigrator {
        async fn ensure_migration(
            &self,
            gr: &GroupResource,
            _write_key_name: &str,
        ) -> anyhow::Result<MigrationStatus> {
            self.ensure_calls.lock().unwrap().push(gr.clone());
            let mut responses = self.responses.lock().unwrap();
            let queue = responses.entry(gr.human()).or_insert_with(|| vec![MigrationStatus::in_progress()]);
            if queue.len() > 1 {
                Ok(queue.remove(0))
            } else {
                Ok(queue[0].clone())
            }
        }

        async fn prune_migration(&self, gr: &GroupResource) -> anyhow::Result<()> {
            self.prune_calls.lock().unwrap().push(gr.clone());
            Ok(())
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<()> {
            mpsc::unbounded_channel().1
        }
    }

    struct FakeProvider {
        grs: Vec<GroupResource>,
        should_run: bool,
    }

    #[async_trait]
    impl EncryptionProvider for FakeProvider {
        fn encrypted_group_resources(&self) -> Vec<GroupResource> {
            self.grs.clone()
        }

        async fn should_run_encryption_controllers(&self) -> anyhow::Result<bool> {
            Ok(self.should_run)
        }
    }

    fn driver(
        key_store: FakeKeyStore,
        deployed: DeployedConfig,
        migrator: FakeMigrator,
        grs: Vec<GroupResource>,
    ) -> (MigrationDriver, Arc<FakeKeyStore>, Arc<FakeMigrator>) {
        let key_store = Arc::new(key_store);
        let migrator = Arc::new(migrator);
        let deployer = Arc::new(FakeDeployer { deployed });
        let provider = Arc::new(FakeProvider { grs, should_run: true });
        let d = MigrationDriver::new(key_store.clone(), deployer, migrator.clone(), provider);
        (d, key_store, migrator)
    }

    /// Scenario 1 (spec.md §8): initial rollout, single key, single GR —
    /// one `Sync` finishes the migration and stamps the key.
    #[tokio::test]
    async fn initial_rollout_migrates_and_stamps() {
        let gr = GroupResource::new("", "secrets");
        let mut config = EncryptionConfig::new();
        config.resources.insert(gr.clone(), vec![key(1)]);
        let deployed = DeployedConfig {
            config: Some(config),
            converged: true,
        };
        let migrator = FakeMigrator::with(&gr, vec![MigrationStatus::succeeded(Utc::now())]);
        let (driver, key_store, _) = driver(FakeKeyStore::new(vec![raw(1)]), deployed, migrator, vec![gr.clone()]);

        let outcome = driver.sync().await.unwrap();
        match outcome {
            SyncOutcome::Completed { degraded, progressing } => {
                assert!(degraded.is_none());
                assert!(progressing.is_empty());
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        let marked = key_store.marked.lock().unwrap();
        assert_eq!(marked.as_slice(), &[("encryption-key-1".to_string(), gr)]);
    }

    /// Scenario 2: fleet mid-rollout — deployer not converged, migrator
    /// never invoked, requeued at the transitional interval.
    #[tokio::test]
    async fn mid_rollout_defers_without_touching_migrator() {
        let gr = GroupResource::new("", "secrets");
        let deployed = DeployedConfig {
            config: None,
            converged: false,
        };
        let migrator = FakeMigrator::default();
        let (driver, _, migrator) = driver(FakeKeyStore::new(vec![raw(1)]), deployed, migrator, vec![gr]);

        let outcome = driver.sync().await.unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Requeued { after } if after == TRANSITIONAL_REQUEUE
        ));
        assert!(migrator.ensure_calls.lock().unwrap().is_empty());
    }

    /// Scenario 3: deployed provider list diverges from desired — every GR
    /// gets pruned, nothing gets `EnsureMigration`d.
    #[tokio::test]
    async fn config_divergence_prunes_and_requeues() {
        let gr = GroupResource::new("", "secrets");
        let mut stale_config = EncryptionConfig::new();
        stale_config.resources.insert(gr.clone(), vec![key(1)]);
        let deployed = DeployedConfig {
            config: Some(stale_config),
            converged: true,
        };
        // Two keys present: desired write key is now id 2, so the deployed
        // config (pinned to id 1) has diverged.
        let migrator = FakeMigrator::default();
        let (driver, _, migrator) = driver(
            FakeKeyStore::new(vec![raw(2), raw(1)]),
            deployed,
            migrator,
            vec![gr.clone()],
        );

        let outcome = driver.sync().await.unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Requeued { after } if after == TRANSITIONAL_REQUEUE
        ));
        assert!(migrator.ensure_calls.lock().unwrap().is_empty());
        assert_eq!(migrator.prune_calls.lock().unwrap().as_slice(), &[gr]);
    }

    /// Scenario 4: migration still running — Progressing carries the GR,
    /// no annotation write.
    #[tokio::test]
    async fn long_migration_reports_progressing_without_stamping() {
        let gr = GroupResource::new("apps", "deployments");
        let mut config = EncryptionConfig::new();
        config.resources.insert(gr.clone(), vec![key(1)]);
        let deployed = DeployedConfig {
            config: Some(config),
            converged: true,
        };
        let migrator = FakeMigrator::with(&gr, vec![MigrationStatus::in_progress()]);
        let (driver, key_store, _) =
            driver(FakeKeyStore::new(vec![raw(1)]), deployed, migrator, vec![gr.clone()]);

        let outcome = driver.sync().await.unwrap();
        match outcome {
            SyncOutcome::Completed { degraded, progressing } => {
                assert!(degraded.is_none());
                assert_eq!(progressing, vec![gr]);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert!(key_store.marked.lock().unwrap().is_empty());
    }

    /// Scenario 5: a stale failure (older than the cooldown) is pruned and
    /// retried; a fresh failure is surfaced without pruning.
    #[tokio::test]
    async fn stale_failure_is_pruned_and_retried() {
        let gr = GroupResource::new("", "secrets");
        let mut config = EncryptionConfig::new();
        config.resources.insert(gr.clone(), vec![key(1)]);
        let deployed = DeployedConfig {
            config: Some(config),
            converged: true,
        };
        let stale_at = Utc::now() - chrono::Duration::minutes(10);
        let migrator = FakeMigrator::with(
            &gr,
            vec![
                MigrationStatus::failed("boom", stale_at),
                MigrationStatus::succeeded(Utc::now()),
            ],
        );
        let (driver, key_store, migrator) =
            driver(FakeKeyStore::new(vec![raw(1)]), deployed, migrator, vec![gr.clone()]);

        let outcome = driver.sync().await.unwrap();
        match outcome {
            SyncOutcome::Completed { degraded, .. } => assert!(degraded.is_none()),
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(migrator.prune_calls.lock().unwrap().as_slice(), &[gr.clone()]);
        assert_eq!(key_store.marked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fresh_failure_is_surfaced_without_pruning() {
        let gr = GroupResource::new("", "secrets");
        let mut config = EncryptionConfig::new();
        config.resources.insert(gr.clone(), vec![key(1)]);
        let deployed = DeployedConfig {
            config: Some(config),
            converged: true,
        };
        let recent_at = Utc::now() - chrono::Duration::minutes(1);
        let migrator = FakeMigrator::with(&gr, vec![MigrationStatus::failed("boom", recent_at)]);
        let (driver, key_store, migrator) =
            driver(FakeKeyStore::new(vec![raw(1)]), deployed, migrator, vec![gr.clone()]);

        let outcome = driver.sync().await.unwrap();
        match outcome {
            SyncOutcome::Completed { degraded, .. } => {
                let message = degraded.expect("expected a degraded message");
                assert!(message.contains("boom"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert!(migrator.prune_calls.lock().unwrap().is_empty());
        assert!(key_store.marked.lock().unwrap().is_empty());
    }
}
