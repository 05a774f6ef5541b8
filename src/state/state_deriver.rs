//! # StateDeriver
//!
//! Computes the current and desired per-GR key state from live secrets and
//! the deployer's reported config (spec.md §4.1).

use crate::model::{DeployedConfig, EncryptionConfig, GrActualKeys, GroupResource, KeyRole, KeyState};
use crate::store::RawKeySecret;
use std::collections::BTreeMap;

/// The result of one derivation pass, consumed by `MigrationDriver`.
pub struct DerivedState {
    pub current_config: Option<EncryptionConfig>,
    pub desired_state: BTreeMap<GroupResource, GrActualKeys>,
    pub desired_config: EncryptionConfig,
    /// Non-empty iff the fleet is mid-rollout: replicas disagree on
    /// revision, or no single key-secret generation accounts for the
    /// deployed config (spec.md §4.1).
    pub transitional_reason: Option<String>,
}

pub struct StateDeriver;

impl StateDeriver {
    /// `raw_keys` is every key secret for the component, newest id first
    /// (as returned by `KeySecretStore::list_keys`). The same ordered key
    /// list underlies every GR; only the Migrated/Read distinction for
    /// non-write keys varies per GR, based on that key's own migration
    /// annotations (spec.md §4.1 rules).
    pub fn derive(
        deployed: &DeployedConfig,
        raw_keys: &[RawKeySecret],
        encrypted_grs: &[GroupResource],
    ) -> DerivedState {
        let transitional_reason = Self::transitional_reason(deployed, raw_keys);

        let mut desired_state = BTreeMap::new();
        let mut desired_config = EncryptionConfig::new();
        for gr in encrypted_grs {
            let actual = Self::desired_for_gr(raw_keys, gr, encrypted_grs);
            desired_config
                .resources
                .insert(gr.clone(), actual.provider_list());
            desired_state.insert(gr.clone(), actual);
        }

        DerivedState {
            current_config: deployed.config.clone(),
            desired_state,
            desired_config,
            transitional_reason,
        }
    }

    /// `encrypted_grs` is the full set the component encrypts, not just
    /// `gr` — a non-write key that has finished migrating every one of
    /// them is no longer referenced by any GR's provider list and is
    /// marked `Unused` rather than `Migrated` (spec.md §4.1: "keys not
    /// referenced become Unused").
    fn desired_for_gr(raw_keys: &[RawKeySecret], gr: &GroupResource, encrypted_grs: &[GroupResource]) -> GrActualKeys {
        let mut states = Vec::with_capacity(raw_keys.len());
        for (idx, raw) in raw_keys.iter().enumerate() {
            let role = if idx == 0 {
                KeyRole::Write
            } else if !encrypted_grs.is_empty()
                && encrypted_grs
                    .iter()
                    .all(|g| raw.annotations.migrated_resources.contains(g))
            {
                KeyRole::Unused
            } else if raw.annotations.migrated_resources.contains(gr) {
                KeyRole::Migrated
            } else {
                KeyRole::Read
            };
            states.push(KeyState {
                key: raw.key.clone(),
                role,
            });
        }
        GrActualKeys(states)
    }

    /// Non-empty whenever the deployer cannot vouch that every replica
    /// observes the same config, or the deployed config doesn't correspond
    /// to any key generation this store currently knows about.
    fn transitional_reason(deployed: &DeployedConfig, raw_keys: &[RawKeySecret]) -> Option<String> {
        if !deployed.converged {
            return Some("API server fleet has not converged on a single revision".to_string());
        }
        let Some(config) = &deployed.config else {
            return Some("deployer has not reported a config yet".to_string());
        };
        let known_secrets: std::collections::HashSet<&str> =
            raw_keys.iter().map(|r| r.key.secret_name.as_str()).collect();
        for keys in config.resources.values() {
            for key in keys {
                if !known_secrets.contains(key.secret_name.as_str()) {
                    return Some(format!(
                        "deployed config references unknown key secret {}",
                        key.secret_name
                    ));
                }
            }
        }
        None
    }
}
