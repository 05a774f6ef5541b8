//! # Key & KeyState
//!
//! Opaque symmetric key material addressed by the name of the secret that
//! carries it, and its role relative to one `GroupResource`.

use crate::model::annotations::KeyAnnotations;
use serde::{Deserialize, Serialize};

/// Cipher mode carried by a key. The controller never chooses or
/// interprets this beyond passing it through to the rendered
/// `EncryptionConfig` — algorithm selection is out of scope (spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Identity,
    Aescbc,
    Aesgcm,
    Secretbox,
}

/// One generation of symmetric key material.
///
/// `id` is a monotonically increasing integer unique within a component;
/// `secret_name` addresses the Kubernetes Secret that carries the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Key {
    pub id: u64,
    pub secret_name: String,
    pub mode: Mode,
}

/// Role a key currently plays for one `GroupResource`.
///
/// At most one key may hold `Write` for a given GR at any instant
/// (invariant 3, spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub enum KeyRole {
    Write,
    Read,
    Migrated,
    Unused,
}

/// A key annotated with its role for one GR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct KeyState {
    pub key: Key,
    pub role: KeyRole,
}

/// The ordered set of `KeyState`s for one GR, as derived from live secrets.
///
/// Ordering follows the provider list convention: write key first, then
/// read keys newest-to-oldest, matching the order API servers must try
/// them in (spec.md §3, `EncryptionConfig`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GrActualKeys(pub Vec<KeyState>);

impl GrActualKeys {
    pub fn has_write_key(&self) -> bool {
        self.0.iter().any(|ks| ks.role == KeyRole::Write)
    }

    pub fn write_key(&self) -> Option<&Key> {
        self.0
            .iter()
            .find(|ks| ks.role == KeyRole::Write)
            .map(|ks| &ks.key)
    }

    /// Provider list this GR's `EncryptionConfig` entry should carry:
    /// write key first (if any), then every read key, oldest migrated
    /// keys included so already-ciphertext objects stay decryptable.
    pub fn provider_list(&self) -> Vec<Key> {
        self.0
            .iter()
            .filter(|ks| matches!(ks.role, KeyRole::Write | KeyRole::Read | KeyRole::Migrated))
            .map(|ks| ks.key.clone())
            .collect()
    }
}

/// One key-secret as read off the cluster: its key material identity plus
/// the migration bookkeeping annotations carried alongside it.
#[derive(Debug, Clone)]
pub struct RawKeySecret {
    pub key: Key,
    pub annotations: KeyAnnotations,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u64) -> Key {
        Key {
            id,
            secret_name: format!("encryption-key-{id}"),
            mode: Mode::Aesgcm,
        }
    }

    #[test]
    fn has_write_key_reflects_roles() {
        let mut actual = GrActualKeys::default();
        assert!(!actual.has_write_key());
        actual.0.push(KeyState {
            key: key(1),
            role: KeyRole::Read,
        });
        assert!(!actual.has_write_key());
        actual.0.push(KeyState {
            key: key(2),
            role: KeyRole::Write,
        });
        assert!(actual.has_write_key());
        assert_eq!(actual.write_key().unwrap().id, 2);
    }

    #[test]
    fn provider_list_excludes_unused_keys() {
        let actual = GrActualKeys(vec![
            KeyState { key: key(3), role: KeyRole::Write },
            KeyState { key: key(2), role: KeyRole::Read },
            KeyState { key: key(1), role: KeyRole::Unused },
        ]);
        let ids: Vec<_> = actual.provider_list().iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
