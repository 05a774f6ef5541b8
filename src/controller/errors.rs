//! # SyncError
//!
//! Typed classification of every error/defer kind one `Sync` pass can
//! produce (spec.md §7's kind/source/policy table). Most variants never
//! reach a caller as `Result::Err` — `Transitional` and `ConfigDiverged`
//! are logged and folded into a `SyncOutcome::Requeued` instead,
//! `AnnotationConflict` is retried internally by `KeySecretStore`,
//! `AnnotationParseError` is logged and treated as empty — but
//! constructing every kind at its real call site keeps the policy table
//! and the code in lockstep, and gives every log line a consistent
//! `%error` rendering.

use crate::model::GroupResource;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// StateDeriver reported a non-empty transitional reason.
    #[error("fleet is transitional: {0}")]
    Transitional(String),

    /// Current provider list differs from the desired one.
    #[error("encryption config has diverged from the desired state")]
    ConfigDiverged,

    /// `EnsureMigration` returned a non-nil `lastResult` within the retry
    /// window (spec.md §4.2 step 4c).
    #[error("migration failed for {gr}: {message}")]
    MigratorFailure { gr: GroupResource, message: String },

    /// `EnsureMigration` transport/internal error.
    #[error("migrator error for {gr}")]
    MigratorError {
        gr: GroupResource,
        #[source]
        source: anyhow::Error,
    },

    /// Optimistic-concurrency conflict on a key secret update; retried
    /// internally by `KeySecretStore`, never surfaced past it.
    #[error("annotation CAS conflict on {secret_name}")]
    AnnotationConflict { secret_name: String },

    /// Corrupt `migrated-resources` annotation JSON; treated as empty.
    #[error("migrated-resources annotation on {secret_name} is corrupt")]
    AnnotationParseError { secret_name: String },

    /// The final status write failed; replaces the tick's outcome so the
    /// work item is re-queued.
    #[error("status update failed")]
    StatusUpdateFailure(#[source] anyhow::Error),
}
