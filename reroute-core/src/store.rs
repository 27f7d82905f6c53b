//! Rule Store
//!
//! Persistence seam for the [`AppState`] aggregate: load and save are
//! effectively atomic over the full value, and every successful save bumps a
//! watch-channel revision so observers can react to changes from any writer.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::error::StoreError;
use crate::state::AppState;

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Read the full aggregate. A store with nothing persisted yet returns
    /// the default state.
    async fn load(&self) -> Result<AppState, StoreError>;

    /// Replace the full aggregate and notify subscribers.
    async fn save(&self, state: &AppState) -> Result<(), StoreError>;

    /// Receiver observing a monotonic revision, bumped after every
    /// successful [`save`](RuleStore::save) from any source. A watch channel
    /// collapses bursts: a subscriber that wakes late sees one change.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Volatile store for tests and embedders that persist elsewhere.
pub struct MemoryStore {
    state: RwLock<AppState>,
    revision: watch::Sender<u64>,
}

impl MemoryStore {
    pub fn new(initial: AppState) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: RwLock::new(initial),
            revision,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn load(&self) -> Result<AppState, StoreError> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &AppState) -> Result<(), StoreError> {
        *self.state.write().await = state.clone();
        self.revision.send_modify(|revision| *revision += 1);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

/// Store backed by a single JSON file holding the serialized aggregate.
///
/// Saves go through a temporary sibling file followed by a rename, so a
/// crash mid-write never leaves a torn state file behind.
pub struct JsonFileStore {
    path: PathBuf,
    revision: watch::Sender<u64>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            path: path.into(),
            revision,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl RuleStore for JsonFileStore {
    async fn load(&self) -> Result<AppState, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            // First run: nothing persisted yet
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "state file absent, using defaults");
                Ok(AppState::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, state: &AppState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        self.revision.send_modify(|revision| *revision += 1);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
