//! # GroupResource
//!
//! Identifier of one kind of stored object: `(group, resource)`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifies one kind of stored object, e.g. `("", "secrets")` or
/// `("apps", "deployments")`.
///
/// Empty `group` is the core Kubernetes API group and renders as `"core"`
/// in human-readable output, never in the wire JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GroupResource {
    #[serde(default)]
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    /// `group/resource` form used for sorting and for condition messages,
    /// with empty group rendered as `core`.
    pub fn human(&self) -> String {
        let group = if self.group.is_empty() {
            "core"
        } else {
            self.group.as_str()
        };
        format!("{group}/{}", self.resource)
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.human())
    }
}

// Ordering is lexicographic on the human `group/resource` rendering, which
// is what the Progressing message and per-Sync processing order rely on.
impl PartialOrd for GroupResource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupResource {
    fn cmp(&self, other: &Self) -> Ordering {
        self.human().cmp(&other.human())
    }
}
