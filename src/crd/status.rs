//! # EncryptionMigrationController status
//!
//! Status types for the two conditions `ConditionReporter` publishes
//! (spec.md §4.5).

use serde::{Deserialize, Serialize};

/// Status of the singleton `EncryptionMigrationController` resource.
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMigrationControllerStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Last time `Sync` ran to completion, regardless of outcome.
    #[serde(default)]
    pub last_sync_time: Option<String>,
}

/// A single condition, matching the `type/status/reason/message` shape
/// the teacher's CRDs use for operator status (`crd/status.rs`).
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

pub const CONDITION_DEGRADED: &str = "EncryptionMigrationControllerDegraded";
pub const CONDITION_PROGRESSING: &str = "EncryptionMigrationControllerProgressing";

impl EncryptionMigrationControllerStatus {
    /// Replace a condition by type, preserving `last_transition_time`
    /// when the status value hasn't changed (standard Kubernetes
    /// condition semantics: transition time tracks status flips, not
    /// every reconcile).
    pub fn set_condition(&mut self, new: Condition, now: &str) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == new.r#type)
        {
            if existing.status == new.status {
                existing.reason = new.reason;
                existing.message = new.message;
            } else {
                *existing = Condition {
                    last_transition_time: Some(now.to_string()),
                    ..new
                };
            }
        } else {
            self.conditions.push(Condition {
                last_transition_time: Some(now.to_string()),
                ..new
            });
        }
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == type_)
    }
}
