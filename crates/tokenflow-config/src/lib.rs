pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable that points directly at a manifest
pub const MANIFEST_ENV: &str = "TOKENFLOW_MANIFEST";

const MANIFEST_CANDIDATES: [&str; 3] = ["tokens.local.yaml", "tokens.yaml", "tokens.yml"];

/// Find the manifest starting from the current directory
pub fn find_manifest_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_manifest_file_from(&current_dir)
}

/// Find the manifest starting from `dir`
///
/// Search order:
/// 1. `TOKENFLOW_MANIFEST` (direct path)
/// 2. `dir`: tokens.local.yaml, tokens.yaml, tokens.yml
/// 3. `dir/.tokenflow/`: same order
/// 4. `~/.config/tokenflow/tokens.yaml` (global)
pub fn find_manifest_file_from(dir: &Path) -> Result<PathBuf> {
    if let Ok(manifest_path) = std::env::var(MANIFEST_ENV) {
        let path = PathBuf::from(manifest_path);
        if path.exists() {
            return Ok(path);
        }
    }

    for filename in &MANIFEST_CANDIDATES {
        let path = dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = dir.join(".tokenflow");
    if project_dir.is_dir() {
        for filename in &MANIFEST_CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("tokenflow").join("tokens.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ManifestNotFound)
}
