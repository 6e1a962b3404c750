use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::state::CoordinationState;
use crate::config::LabConfig;

/// Errors that can occur during coordination state persistence
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Lock acquisition failed: {reason}")]
    LockError { reason: String },
}

/// Whole-document access to the coordination snapshot.
///
/// There is no partial update: callers read, modify and write back. Two
/// concurrent writers race and the last one wins.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Full snapshot; seeds the store on first access
    async fn read(&self) -> Result<CoordinationState, StoreError>;

    /// Overwrite the stored snapshot
    async fn write(&self, state: &CoordinationState) -> Result<(), StoreError>;
}

/// Read-modify-write helper. The active count is recomputed before writing.
pub async fn modify<F>(store: &dyn StateStore, change: F) -> Result<CoordinationState, StoreError>
where
    F: FnOnce(&mut CoordinationState) + Send,
{
    let mut state = store.read().await?;
    change(&mut state);
    state.recount();
    store.write(&state).await?;
    Ok(state)
}

/// JSON coordination file on the local file system
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    seed: CoordinationState,
}

impl FileStateStore {
    /// `seed` is written the first time the file is found missing
    pub fn new(path: impl Into<PathBuf>, seed: CoordinationState) -> Self {
        Self {
            path: path.into(),
            seed,
        }
    }

    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(
            config.state.file_path.clone(),
            CoordinationState::from_config(config, Utc::now()),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the seed state. An existing file is kept unless `force`.
    /// Returns whether the file was written.
    pub async fn initialize(&self, force: bool) -> Result<bool, StoreError> {
        if self.exists() && !force {
            debug!(path = %self.path.display(), "Coordination file already exists");
            return Ok(false);
        }

        let mut seed = self.seed.clone();
        seed.created_at = Utc::now();
        self.write(&seed).await?;
        info!(path = %self.path.display(), "Coordination file initialised");
        Ok(true)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn read(&self) -> Result<CoordinationState, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.initialize(false).await?;
                let content = fs::read_to_string(&self.path).await?;
                Ok(serde_json::from_str(&content)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, state: &CoordinationState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut state = state.clone();
        state.recount();
        let serialized = serde_json::to_string_pretty(&state)?;

        // Write to temporary file first, then rename (atomic operation)
        let mut temp_file = self.path.clone().into_os_string();
        temp_file.push(".tmp");
        fs::write(&temp_file, serialized).await?;
        fs::rename(&temp_file, &self.path).await?;

        debug!(path = %self.path.display(), active_agents = state.coordination.active_agents, "Coordination state saved");
        Ok(())
    }
}

/// Store kept in memory, for tests and embedding
#[derive(Debug)]
pub struct InMemoryStateStore {
    seed: CoordinationState,
    state: Mutex<Option<CoordinationState>>,
}

impl InMemoryStateStore {
    pub fn new(seed: CoordinationState) -> Self {
        Self {
            seed,
            state: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn read(&self) -> Result<CoordinationState, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.get_or_insert_with(|| self.seed.clone()).clone())
    }

    async fn write(&self, state: &CoordinationState) -> Result<(), StoreError> {
        let mut stored = state.clone();
        stored.recount();
        *self.state.lock().await = Some(stored);
        Ok(())
    }
}
