//! State management for managed resources
//!
//! Manages the `.tokenflow/state.json` file which tracks the last observed
//! attributes of every resource under management.

use crate::error::{Result, StateError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".tokenflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_STAGING: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Age after which a lock is treated as abandoned
pub const STALE_LOCK_HOURS: i64 = 1;

/// Build the state key for a resource (`<type>.<address>`)
pub fn resource_key(resource_type: &str, address: &str) -> String {
    format!("{}.{}", resource_type, address)
}

/// Global state containing every tracked resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by `<type>.<address>`
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all resources of a given type
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&String, &ResourceState)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .collect()
    }

    /// Add or replace a resource
    pub fn set_resource(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by key
    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }
}

/// Tracked record of a single resource
///
/// The attribute payload is owned by the resource implementation; this store
/// only knows how to persist it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g. "cloudflare_user_token")
    pub resource_type: String,

    /// Resource attributes as last observed
    pub attributes: serde_json::Value,

    /// When the record was first written
    pub created_at: DateTime<Utc>,

    /// Last time the attributes changed
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            resource_type: resource_type.into(),
            attributes: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a record from a typed attribute struct
    pub fn from_attributes<T: Serialize>(
        resource_type: impl Into<String>,
        attrs: &T,
    ) -> Result<Self> {
        let mut state = Self::new(resource_type);
        state.attributes = serde_json::to_value(attrs)?;
        Ok(state)
    }

    /// Replace the attributes, bumping `updated_at`
    pub fn set_attributes<T: Serialize>(&mut self, attrs: &T) -> Result<()> {
        self.attributes = serde_json::to_value(attrs)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Decode the attributes into a typed struct
    pub fn attributes<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.attributes.clone())?)
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Path of the current state file
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(StateError::StateFile(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state, rotating the previous file to `state.json.backup`
    ///
    /// The new content is written to a sibling temp file first so a failed
    /// write never truncates the current state.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let staged = self.state_dir().join(STATE_STAGING);
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&staged, content).await?;

        if path.exists() {
            let backup = self.backup_path();
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Rotated state backup");
        }
        fs::rename(&staged, &path).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire the state lock
    ///
    /// The lock file is created with `create_new`, so two processes racing
    /// for it cannot both succeed. A lock older than [`STALE_LOCK_HOURS`] is
    /// removed and taken over once.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let holder = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_vec_pretty(&holder)?;

        let mut file = match create_lock_file(&lock_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                clear_stale_lock(&lock_path).await?;
                create_lock_file(&lock_path).await.map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        StateError::Lock("State lock was taken by another process".to_string())
                    } else {
                        e.into()
                    }
                })?
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&content).await?;
        file.flush().await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

async fn create_lock_file(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

/// Remove `path` if it holds an abandoned lock, otherwise report who holds it
async fn clear_stale_lock(path: &Path) -> Result<()> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        // Released between our create attempt and this read
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    // An unparsable lock is one still being written by its holder
    let info: LockInfo = serde_json::from_str(&content)
        .map_err(|_| StateError::Lock("State lock is being acquired elsewhere".to_string()))?;

    let age = Utc::now().signed_duration_since(info.acquired_at);
    if age.num_hours() < STALE_LOCK_HOURS {
        return Err(StateError::Lock(format!(
            "State is locked by {} since {}",
            info.holder, info.acquired_at
        )));
    }

    tracing::warn!("Removing stale lock held by {} since {}", info.holder, info.acquired_at);
    match fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {
                tracing::debug!("Released state lock");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
