pub mod create;
pub mod destroy;
pub mod refresh;
pub mod show;
pub mod update;
pub mod verify;

use crate::manifest::Manifest;
use anyhow::Context as _;
use std::path::{Path, PathBuf};
use tokenflow_cloudflare::{
    ApiConfig, CloudflareClient, RESOURCE_TYPE, UserTokenResource, UserTokenState,
};
use tokenflow_config::ConfigError;
use tokenflow_state::{GlobalState, StateManager, resource_key};

/// Shared inputs for every command
pub struct Context {
    manifest_path: Option<PathBuf>,
    pub state: StateManager,
}

impl Context {
    pub fn new(manifest_path: Option<PathBuf>, state_dir: &Path) -> Self {
        Self {
            manifest_path,
            state: StateManager::new(state_dir),
        }
    }

    pub fn manifest(&self) -> anyhow::Result<Manifest> {
        self.manifest_if_present()?
            .ok_or_else(|| ConfigError::ManifestNotFound.into())
    }

    /// Load the manifest, or `None` when discovery finds no manifest at all
    ///
    /// An explicit `--manifest` path must exist. Read and validation errors
    /// are always returned.
    pub fn manifest_if_present(&self) -> anyhow::Result<Option<Manifest>> {
        let path = match &self.manifest_path {
            Some(path) => path.clone(),
            None => match tokenflow_config::find_manifest_file() {
                Ok(path) => path,
                Err(ConfigError::ManifestNotFound) => return Ok(None),
                Err(e) => return Err(e.into()),
            },
        };
        tracing::debug!("Using manifest {}", path.display());
        Manifest::load(&path).map(Some)
    }

    pub fn resource(&self) -> anyhow::Result<UserTokenResource<CloudflareClient>> {
        let config = ApiConfig::from_env().context("Cloudflare credentials are not configured")?;
        Ok(UserTokenResource::new(CloudflareClient::new(config)))
    }
}

pub fn state_key(address: &str) -> String {
    resource_key(RESOURCE_TYPE, address)
}

/// Load the tracked token at `address`
pub fn tracked(global: &GlobalState, address: &str) -> anyhow::Result<UserTokenState> {
    let record = global
        .get_resource(&state_key(address))
        .with_context(|| format!("token {} is not tracked", address))?;
    Ok(UserTokenState::from_record(record)?)
}

/// Store `state` at `address`, keeping the record's creation time
pub fn store(
    global: &mut GlobalState,
    address: &str,
    state: &UserTokenState,
) -> anyhow::Result<()> {
    let key = state_key(address);
    let record = match global.get_resource(&key) {
        Some(existing) => {
            let mut record = existing.clone();
            record.set_attributes(state)?;
            record
        }
        None => state.to_record()?,
    };
    global.set_resource(key, record);
    Ok(())
}

/// Addresses of every tracked user token
pub fn tracked_addresses(global: &GlobalState) -> Vec<String> {
    let prefix = format!("{}.", RESOURCE_TYPE);
    global
        .resources_of_type(RESOURCE_TYPE)
        .into_iter()
        .filter_map(|(key, _)| key.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_load_tracked() {
        let mut global = GlobalState::new();
        let state = UserTokenState {
            id: Some("tok-1".to_string()),
            name: "ci-token".to_string(),
            ..Default::default()
        };

        store(&mut global, "ci", &state).unwrap();

        assert_eq!(tracked(&global, "ci").unwrap(), state);
        assert_eq!(tracked_addresses(&global), vec!["ci".to_string()]);
        assert!(tracked(&global, "other").is_err());
    }

    #[test]
    fn test_explicit_manifest_errors_are_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        std::fs::write(&path, "tokens:\n  ci:\n    name: ci-token\n").unwrap();
        let ctx = Context::new(Some(path), dir.path());

        let err = ctx.manifest_if_present().unwrap_err();
        assert!(format!("{:#}", err).contains("at least one policy block"));
    }

    #[test]
    fn test_explicit_manifest_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        let manifest = r#"
tokens:
  ci:
    name: ci-token
    policy:
      - resources: ["zone:1"]
        permission_groups: ["pg-1"]
"#;
        std::fs::write(&path, manifest).unwrap();
        let ctx = Context::new(Some(path), dir.path());

        let manifest = ctx.manifest_if_present().unwrap().unwrap();
        assert!(manifest.tokens.contains_key("ci"));
    }

    #[test]
    fn test_store_keeps_created_at() {
        let mut global = GlobalState::new();
        let mut state = UserTokenState::default();
        store(&mut global, "ci", &state).unwrap();
        let created_at = global.get_resource("cloudflare_user_token.ci").unwrap().created_at;

        state.status = "disabled".to_string();
        store(&mut global, "ci", &state).unwrap();

        let record = global.get_resource("cloudflare_user_token.ci").unwrap();
        assert_eq!(record.created_at, created_at);
        assert_eq!(tracked(&global, "ci").unwrap().status, "disabled");
    }
}
