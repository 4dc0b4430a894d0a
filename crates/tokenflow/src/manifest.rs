//! Desired-state manifest (`tokens.yaml`)
//!
//! ```yaml
//! tokens:
//!   ci:
//!     name: ci-token
//!     policy:
//!       - resources: ["com.cloudflare.api.account.zone.123"]
//!         permission_groups: ["pg-1"]
//! ```

use anyhow::{Context, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokenflow_cloudflare::DesiredToken;

#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    /// Tokens keyed by address
    #[serde(default)]
    pub tokens: BTreeMap<String, DesiredToken>,
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid manifest {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content)?;

        for (address, token) in &manifest.tokens {
            validate_address(address)?;
            token
                .validate()
                .with_context(|| format!("token {}", address))?;
        }

        Ok(manifest)
    }

    pub fn token(&self, address: &str) -> anyhow::Result<&DesiredToken> {
        self.tokens
            .get(address)
            .with_context(|| format!("token {} is not defined in the manifest", address))
    }
}

fn validate_address(address: &str) -> anyhow::Result<()> {
    let valid = !address.is_empty()
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        bail!(
            "invalid token address {:?}: use letters, digits, '-' and '_'",
            address
        );
    }
    Ok(())
}
