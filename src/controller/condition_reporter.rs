//! # ConditionReporter
//!
//! Publishes the two conditions on the `EncryptionMigrationController`
//! status object (spec.md §4.5). Runs as a deferred finalizer of `Sync`,
//! but only for a `Completed` outcome: `Suppressed` (precondition/provider
//! gate failed) and `Requeued` (transitional fleet, or config divergence)
//! both leave whatever conditions already exist untouched, per spec.md
//! §7's "no condition change" policy for those rows.

use crate::controller::migration_driver::SyncOutcome;
use crate::crd::{
    Condition, ConditionStatus, EncryptionMigrationController, EncryptionMigrationControllerStatus,
    CONDITION_DEGRADED, CONDITION_PROGRESSING,
};
use anyhow::{Context, Result};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

const FIELD_MANAGER: &str = "encryption-migration-controller";

pub struct ConditionReporter {
    client: Client,
}

impl ConditionReporter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// `name` addresses the singleton `EncryptionMigrationController`
    /// instance this component's `Sync` just ran against.
    pub async fn report(&self, name: &str, outcome: &SyncOutcome) -> Result<()> {
        let Some((degraded, progressing)) = conditions_for(outcome) else {
            return Ok(());
        };

        let api: Api<EncryptionMigrationController> = Api::all(self.client.clone());
        let current = api.get(name).await.context("fetching controller status")?;

        let now = chrono::Utc::now().to_rfc3339();
        let mut status = current.status.clone().unwrap_or_default();

        status.set_condition(
            degraded_condition(degraded.as_deref(), &now),
            &now,
        );
        status.set_condition(
            progressing_condition(progressing.as_deref(), &now),
            &now,
        );
        status.last_sync_time = Some(now);

        if status_unchanged(&current.status, &status) {
            tracing::debug!(name, "conditions unchanged, skipping status write");
            return Ok(());
        }

        let patch = serde_json::json!({ "status": status });
        match api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                tracing::debug!(name, "controller resource deleted mid-sync, skipping status update");
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!(e)).context("writing controller status"),
        }
    }
}

/// What to publish for a given outcome, or `None` to leave the status
/// object untouched entirely (spec.md §7: `Suppressed` and `Requeued`
/// both carry "no condition change").
fn conditions_for(outcome: &SyncOutcome) -> Option<(Option<String>, Option<Vec<crate::model::GroupResource>>)> {
    match outcome {
        SyncOutcome::Suppressed => None,
        SyncOutcome::Requeued { .. } => None,
        SyncOutcome::Completed { degraded, progressing } => Some((degraded.clone(), Some(progressing.clone()))),
    }
}

fn degraded_condition(degraded: Option<&str>, now: &str) -> Condition {
    match degraded {
        Some(message) => Condition {
            r#type: CONDITION_DEGRADED.to_string(),
            status: ConditionStatus::True,
            last_transition_time: Some(now.to_string()),
            reason: Some("MigrationFailed".to_string()),
            message: Some(message.to_string()),
        },
        None => Condition {
            r#type: CONDITION_DEGRADED.to_string(),
            status: ConditionStatus::False,
            last_transition_time: Some(now.to_string()),
            reason: Some("AsExpected".to_string()),
            message: None,
        },
    }
}

fn progressing_condition(migrating: Option<&[crate::model::GroupResource]>, now: &str) -> Condition {
    match migrating {
        Some(grs) if !grs.is_empty() => Condition {
            r#type: CONDITION_PROGRESSING.to_string(),
            status: ConditionStatus::True,
            last_transition_time: Some(now.to_string()),
            reason: Some("MigrationInProgress".to_string()),
            message: Some(format!(
                "migrating: {}",
                grs.iter().map(|gr| gr.human()).collect::<Vec<_>>().join(", ")
            )),
        },
        _ => Condition {
            r#type: CONDITION_PROGRESSING.to_string(),
            status: ConditionStatus::False,
            last_transition_time: Some(now.to_string()),
            reason: Some("AsExpected".to_string()),
            message: None,
        },
    }
}

fn status_unchanged(
    existing: &Option<EncryptionMigrationControllerStatus>,
    next: &EncryptionMigrationControllerStatus,
) -> bool {
    let Some(existing) = existing else {
        return false;
    };
    let same_condition = |type_: &str| {
        let a = existing.condition(type_).map(|c| (c.status, c.message.clone()));
        let b = next.condition(type_).map(|c| (c.status, c.message.clone()));
        a == b
    };
    same_condition(CONDITION_DEGRADED) && same_condition(CONDITION_PROGRESSING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GroupResource;
    use std::time::Duration;

    /// spec.md §7: a Transitional or ConfigDiverged requeue must not
    /// clear an existing Degraded/Progressing condition.
    #[test]
    fn requeued_leaves_conditions_untouched() {
        let outcome = SyncOutcome::Requeued {
            after: Duration::from_secs(120),
        };
        assert!(conditions_for(&outcome).is_none());
    }

    #[test]
    fn suppressed_leaves_conditions_untouched() {
        assert!(conditions_for(&SyncOutcome::Suppressed).is_none());
    }

    #[test]
    fn completed_with_no_errors_clears_degraded() {
        let outcome = SyncOutcome::Completed {
            degraded: None,
            progressing: vec![],
        };
        let (degraded, progressing) = conditions_for(&outcome).expect("Completed always reports");
        assert!(degraded.is_none());
        assert_eq!(progressing, Some(vec![]));

        let condition = degraded_condition(degraded.as_deref(), "t0");
        assert_eq!(condition.status, ConditionStatus::False);
    }

    #[test]
    fn completed_with_errors_sets_degraded_true() {
        let outcome = SyncOutcome::Completed {
            degraded: Some("migration failed for core/secrets: boom".to_string()),
            progressing: vec![],
        };
        let (degraded, _) = conditions_for(&outcome).expect("Completed always reports");
        let condition = degraded_condition(degraded.as_deref(), "t0");
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.message.as_deref(), Some("migration failed for core/secrets: boom"));
    }

    #[test]
    fn progressing_condition_lists_migrating_resources() {
        let grs = vec![GroupResource::new("", "secrets"), GroupResource::new("apps", "deployments")];
        let condition = progressing_condition(Some(&grs), "t0");
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.message.as_deref(), Some("migrating: core/secrets, apps/deployments"));
    }

    #[test]
    fn progressing_condition_empty_list_is_as_expected() {
        let condition = progressing_condition(Some(&[]), "t0");
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason.as_deref(), Some("AsExpected"));
    }

    #[test]
    fn status_unchanged_ignores_last_sync_time_churn() {
        let mut existing = EncryptionMigrationControllerStatus::default();
        existing.set_condition(degraded_condition(None, "t0"), "t0");
        existing.set_condition(progressing_condition(Some(&[]), "t0"), "t0");
        existing.last_sync_time = Some("t0".to_string());

        let mut next = existing.clone();
        next.last_sync_time = Some("t1".to_string());

        assert!(status_unchanged(&Some(existing), &next));
    }

    #[test]
    fn status_unchanged_detects_a_real_degraded_flip() {
        let mut existing = EncryptionMigrationControllerStatus::default();
        existing.set_condition(degraded_condition(None, "t0"), "t0");

        let mut next = existing.clone();
        next.set_condition(degraded_condition(Some("boom"), "t1"), "t1");

        assert!(!status_unchanged(&Some(existing), &next));
    }
}
