//! Policy translation between the manifest and the API
//!
//! The manifest describes a policy as two flat string lists. The API wants a
//! resource map (every resource granted `"*"`), wrapped permission group ids
//! and an explicit effect. Both directions are pure.

use crate::model::{PermissionGroupRef, PolicyEffect, RESOURCE_ACCESS_ALL, UserTokenPolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One allow rule as written in the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBlock {
    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default)]
    pub permission_groups: Vec<String>,
}

impl PolicyBlock {
    pub fn new<R, P>(resources: R, permission_groups: P) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            permission_groups: permission_groups.into_iter().map(Into::into).collect(),
        }
    }

    /// Content-addressed identity of the block
    ///
    /// Hex SHA-256 over the sorted, deduplicated resources and permission
    /// groups. Blocks with the same key are the same policy.
    pub fn content_key(&self) -> String {
        let resources: BTreeSet<&str> = self.resources.iter().map(String::as_str).collect();
        let groups: BTreeSet<&str> = self.permission_groups.iter().map(String::as_str).collect();

        let mut hasher = Sha256::new();
        for r in resources {
            hasher.update(b"r:");
            hasher.update(r.as_bytes());
            hasher.update(b"\n");
        }
        for g in groups {
            hasher.update(b"g:");
            hasher.update(g.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// Build the API policies for a list of manifest blocks
///
/// Block order is preserved. Empty lists are passed through as empty maps and
/// lists; validation happens elsewhere.
pub fn to_remote(blocks: &[PolicyBlock]) -> Vec<UserTokenPolicy> {
    blocks
        .iter()
        .map(|block| {
            let resources: BTreeMap<String, String> = block
                .resources
                .iter()
                .map(|r| (r.clone(), RESOURCE_ACCESS_ALL.to_string()))
                .collect();

            let permission_groups = block
                .permission_groups
                .iter()
                .map(PermissionGroupRef::new)
                .collect();

            UserTokenPolicy {
                id: None,
                effect: PolicyEffect::Allow,
                resources,
                permission_groups,
            }
        })
        .collect()
}

/// Flatten API policies back into manifest blocks
///
/// The effect is dropped since blocks can only express allow rules. Resource
/// order follows the map and must be compared as a set.
pub fn from_remote(policies: &[UserTokenPolicy]) -> Vec<PolicyBlock> {
    policies
        .iter()
        .map(|policy| {
            if policy.effect != PolicyEffect::Allow {
                tracing::warn!(
                    policy_id = policy.id.as_deref().unwrap_or("-"),
                    effect = %policy.effect,
                    "policy effect cannot be represented in the manifest and is dropped"
                );
            }

            PolicyBlock {
                resources: policy.resources.keys().cloned().collect(),
                permission_groups: policy
                    .permission_groups
                    .iter()
                    .map(|pg| pg.id.clone())
                    .collect(),
            }
        })
        .collect()
}

/// Collapse structurally identical blocks, keeping the first of each
pub fn dedup_blocks(blocks: &[PolicyBlock]) -> Vec<PolicyBlock> {
    let mut seen = HashSet::new();
    blocks
        .iter()
        .filter(|b| seen.insert(b.content_key()))
        .cloned()
        .collect()
}

/// Compare two block collections with set semantics
pub fn same_policy_set(a: &[PolicyBlock], b: &[PolicyBlock]) -> bool {
    let keys = |blocks: &[PolicyBlock]| -> BTreeSet<String> {
        blocks.iter().map(PolicyBlock::content_key).collect()
    };
    keys(a) == keys(b)
}
