//! Data shapes for Cloudflare user tokens
//!
//! [`UserToken`] and [`UserTokenPolicy`] mirror the `/user/tokens` API
//! payloads. [`DesiredToken`] is the user-authored definition read from the
//! manifest.

use crate::error::{Result, TokenError};
use crate::policy::PolicyBlock;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Access level granted to every resource listed in a policy
pub const RESOURCE_ACCESS_ALL: &str = "*";

/// Format a timestamp the way tracked state stores it (RFC3339, nanoseconds)
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Token secret material
///
/// Only returned by the API when the token is created. `Debug` never prints
/// the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret. Do not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue([redacted])")
    }
}

/// Effect of a policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyEffect {
    #[default]
    Allow,
    Deny,
}

impl fmt::Display for PolicyEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEffect::Allow => write!(f, "allow"),
            PolicyEffect::Deny => write!(f, "deny"),
        }
    }
}

/// Reference to a permission group by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroupRef {
    pub id: String,

    /// Display name, filled in by the API on reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PermissionGroupRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Policy as the API represents it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTokenPolicy {
    /// Server-assigned policy id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub effect: PolicyEffect,

    /// Resource scope -> access level
    #[serde(default)]
    pub resources: BTreeMap<String, String>,

    #[serde(default)]
    pub permission_groups: Vec<PermissionGroupRef>,
}

/// User token as returned by the API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserToken {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Secret, present only in the create response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SecretValue>,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub issued_on: Option<DateTime<Utc>>,

    #[serde(default)]
    pub modified_on: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,

    #[serde(default)]
    pub policies: Vec<UserTokenPolicy>,
}

/// Result of `GET /user/tokens/verify`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenVerification {
    pub id: String,
    pub status: String,

    #[serde(default)]
    pub expires_on: Option<DateTime<Utc>>,
}

/// User-authored definition of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredToken {
    pub name: String,

    #[serde(default)]
    pub policy: Vec<PolicyBlock>,
}

impl DesiredToken {
    pub fn new(name: impl Into<String>, policy: Vec<PolicyBlock>) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    /// Check the required fields are present
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TokenError::InvalidDesired("name must not be empty".to_string()));
        }
        if self.policy.is_empty() {
            return Err(TokenError::InvalidDesired(format!(
                "token {:?} needs at least one policy block",
                self.name
            )));
        }
        Ok(())
    }
}
