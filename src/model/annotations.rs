//! # Key-secret annotation protocol
//!
//! The on-disk contract other controllers observe (spec.md §6): two
//! annotations carried on the write-key secret once a GR has finished
//! migrating under that key.

use crate::controller::errors::SyncError;
use crate::model::gr::GroupResource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ANNOTATION_MIGRATED_TIMESTAMP: &str =
    "encryption.operator.openshift.io/migrated-timestamp";
pub const ANNOTATION_MIGRATED_RESOURCES: &str =
    "encryption.operator.openshift.io/migrated-resources";

/// `{"resources":[{"group":g,"resource":r}, …]}` — the set of GRs a key
/// has completed migration for.
///
/// Backed by a `BTreeSet` so serde's derived `Serialize` already produces
/// the canonical, byte-stable encoding the design notes (spec.md §9)
/// require: sorted, no insignificant whitespace. Byte-equal inputs always
/// yield byte-equal output, so repeated no-op syncs never churn the
/// secret's resource version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigratedResources {
    #[serde(default)]
    resources: std::collections::BTreeSet<GroupResource>,
}

impl MigratedResources {
    pub fn contains(&self, gr: &GroupResource) -> bool {
        self.resources.contains(gr)
    }

    /// Insert a GR. Append-only per invariant 2 (spec.md §3): callers
    /// never remove entries, so this is the only mutator exposed.
    pub fn insert(&mut self, gr: GroupResource) -> bool {
        self.resources.insert(gr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupResource> {
        self.resources.iter()
    }

    /// Parse the raw annotation value. A corrupt payload resets to the
    /// empty set rather than failing the sync — `AnnotationParseError` in
    /// spec.md §7, worst case a redundant migration next cycle.
    pub fn parse_or_empty(raw: Option<&str>, secret_name: Option<&str>) -> Self {
        match raw {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| {
                let error = SyncError::AnnotationParseError {
                    secret_name: secret_name.unwrap_or("?").to_string(),
                };
                tracing::warn!(%error, "resetting to empty");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn to_json(&self) -> String {
        // BTreeMap/BTreeSet fields serialize pre-sorted; serde_json emits
        // no insignificant whitespace by default, so this is already the
        // canonical encoding.
        serde_json::to_string(self).expect("MigratedResources is always serializable")
    }
}

/// The outcome of applying the annotation update algorithm (spec.md §4.3)
/// to one write-key secret for one GR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationUpdate {
    /// Nothing to do: the GR was already migrated and the timestamp was
    /// already present.
    Unchanged,
    /// New annotation values to write back, guarded by CAS on the caller
    /// side.
    Changed {
        migrated_resources: String,
        migrated_timestamp: String,
    },
}

/// Pure implementation of the annotation update algorithm in spec.md §4.3.
///
/// `now` is passed in rather than read from the clock so the five-step
/// algorithm stays unit-testable without faking time globally.
pub fn compute_annotation_update(
    existing_resources_json: Option<&str>,
    existing_timestamp: Option<&str>,
    gr: &GroupResource,
    now: DateTime<Utc>,
    secret_name: Option<&str>,
) -> AnnotationUpdate {
    let mut resources = MigratedResources::parse_or_empty(existing_resources_json, secret_name);
    let already_migrated = resources.contains(gr);

    if already_migrated && existing_timestamp.is_some() {
        return AnnotationUpdate::Unchanged;
    }

    if !already_migrated {
        resources.insert(gr.clone());
    }

    AnnotationUpdate::Changed {
        migrated_resources: resources.to_json(),
        migrated_timestamp: now.to_rfc3339(),
    }
}

/// Typed view over the two annotations as read off a live secret, for
/// code that wants structured access rather than raw strings.
#[derive(Debug, Clone, Default)]
pub struct KeyAnnotations {
    pub migrated_resources: MigratedResources,
    pub migrated_timestamp: Option<DateTime<Utc>>,
}

impl KeyAnnotations {
    pub fn from_map(annotations: &BTreeMap<String, String>, secret_name: Option<&str>) -> Self {
        let migrated_resources = MigratedResources::parse_or_empty(
            annotations.get(ANNOTATION_MIGRATED_RESOURCES).map(String::as_str),
            secret_name,
        );
        let migrated_timestamp = annotations
            .get(ANNOTATION_MIGRATED_TIMESTAMP)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Self {
            migrated_resources,
            migrated_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap()
    }

    #[test]
    fn round_trip_preserves_set() {
        let mut m = MigratedResources::default();
        m.insert(GroupResource::new("", "secrets"));
        m.insert(GroupResource::new("apps", "deployments"));
        let json = m.to_json();
        let parsed = MigratedResources::parse_or_empty(Some(&json), None);
        assert_eq!(parsed, m);
    }

    #[test]
    fn corrupt_json_resets_to_empty() {
        let parsed = MigratedResources::parse_or_empty(Some("{not json"), Some("key-3"));
        assert_eq!(parsed, MigratedResources::default());
    }

    #[test]
    fn missing_annotation_is_empty() {
        let parsed = MigratedResources::parse_or_empty(None, None);
        assert_eq!(parsed, MigratedResources::default());
    }

    #[test]
    fn fresh_migration_inserts_and_stamps() {
        let gr = GroupResource::new("", "secrets");
        let update = compute_annotation_update(None, None, &gr, now(), None);
        match update {
            AnnotationUpdate::Changed {
                migrated_resources,
                migrated_timestamp,
            } => {
                let parsed = MigratedResources::parse_or_empty(Some(&migrated_resources), None);
                assert!(parsed.contains(&gr));
                assert_eq!(migrated_timestamp, now().to_rfc3339());
            }
            AnnotationUpdate::Unchanged => panic!("expected a change"),
        }
    }

    #[test]
    fn already_migrated_with_timestamp_is_unchanged() {
        let gr = GroupResource::new("", "secrets");
        let mut resources = MigratedResources::default();
        resources.insert(gr.clone());
        let json = resources.to_json();
        let update = compute_annotation_update(Some(&json), Some(&now().to_rfc3339()), &gr, now(), None);
        assert_eq!(update, AnnotationUpdate::Unchanged);
    }

    #[test]
    fn migrated_resource_without_timestamp_still_stamps() {
        // Can happen if a previous write was interrupted between steps.
        let gr = GroupResource::new("", "secrets");
        let mut resources = MigratedResources::default();
        resources.insert(gr.clone());
        let json = resources.to_json();
        let update = compute_annotation_update(Some(&json), None, &gr, now(), None);
        assert!(matches!(update, AnnotationUpdate::Changed { .. }));
    }

    #[test]
    fn second_gr_is_appended_not_replaced() {
        let secrets = GroupResource::new("", "secrets");
        let deployments = GroupResource::new("apps", "deployments");
        let mut resources = MigratedResources::default();
        resources.insert(secrets.clone());
        let json = resources.to_json();

        let update = compute_annotation_update(Some(&json), Some(&now().to_rfc3339()), &deployments, now(), None);
        match update {
            AnnotationUpdate::Changed { migrated_resources, .. } => {
                let parsed = MigratedResources::parse_or_empty(Some(&migrated_resources), None);
                assert!(parsed.contains(&secrets));
                assert!(parsed.contains(&deployments));
            }
            AnnotationUpdate::Unchanged => panic!("expected a change"),
        }
    }

    #[test]
    fn corrupt_existing_json_is_treated_as_empty_and_remigrates() {
        let gr = GroupResource::new("", "secrets");
        let update = compute_annotation_update(Some("{garbage"), None, &gr, now(), Some("key-3"));
        assert!(matches!(update, AnnotationUpdate::Changed { .. }));
    }

    /// Boundary scenario 6 (spec.md §8): a CAS attempt that loses a
    /// conflict and retries against the refreshed secret must land on the
    /// same final annotations as a CAS that wins on the first try.
    #[test]
    fn retried_cas_converges_to_same_state_as_first_try_success() {
        let gr = GroupResource::new("", "secrets");

        let first_try = compute_annotation_update(None, None, &gr, now(), None);
        let AnnotationUpdate::Changed {
            migrated_resources: resources_after_first,
            migrated_timestamp: timestamp_after_first,
        } = first_try
        else {
            panic!("expected a change");
        };

        // Simulate losing the CAS: recompute against the secret state the
        // winning writer left behind, as `KeySecretStore::mark_migrated`
        // does on a 409.
        let retried = compute_annotation_update(
            Some(&resources_after_first),
            Some(&timestamp_after_first),
            &gr,
            now(),
            None,
        );
        assert_eq!(retried, AnnotationUpdate::Unchanged);
    }
}
