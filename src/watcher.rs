//! Index file watcher for hot-reloading while serving.
//!
//! Polls the index file's modification time and swaps a freshly loaded index
//! into the running [`SearchEngine`]. A reload that fails is logged and the
//! current index keeps serving.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::engine::SearchEngine;
use crate::error::{EngineError, EngineResult};
use crate::vector::load_index;

/// Watches the index file and reloads it when it changes.
pub struct IndexWatcher {
    index_path: PathBuf,
    engine: Arc<SearchEngine>,
    last_modified: Option<SystemTime>,
    check_interval: Duration,
}

impl IndexWatcher {
    /// Create a watcher; the file's current modification time counts as seen.
    pub fn new(engine: Arc<SearchEngine>, index_path: PathBuf, check_interval: Duration) -> Self {
        let last_modified = modified_time(&index_path);
        Self {
            index_path,
            engine,
            last_modified,
            check_interval,
        }
    }

    /// Poll forever. Meant to be spawned on the runtime.
    pub async fn watch(mut self) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "Starting index watcher with {} second interval",
            self.check_interval.as_secs()
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.check_and_reload().await {
                error!("Failed to reload index from {}: {e}", self.index_path.display());
            }
        }
    }

    /// Reload the index if the file changed since the last check.
    ///
    /// Returns `Ok(true)` when a new index was swapped in.
    pub async fn check_and_reload(&mut self) -> EngineResult<bool> {
        let Some(current) = modified_time(&self.index_path) else {
            debug!("Index file does not exist at {}", self.index_path.display());
            return Ok(false);
        };

        if self.last_modified == Some(current) {
            debug!("Index file unchanged");
            return Ok(false);
        }
        // Remember this version even if it fails to load, so a bad file is
        // reported once rather than on every tick.
        self.last_modified = Some(current);

        info!("Index file changed, reloading from {}", self.index_path.display());

        let path = self.index_path.clone();
        let dimension = self.engine.embedder().dimension();
        let metric = self.engine.metric();
        let index = tokio::task::spawn_blocking(move || load_index(&path, dimension, metric))
            .await
            .map_err(|e| EngineError::io(&self.index_path, std::io::Error::other(e)))??;

        match self.engine.replace_index(index) {
            Ok(previous) => {
                info!(
                    "Index successfully reloaded with {} documents (was {})",
                    self.engine.info().documents,
                    previous.len()
                );
                Ok(true)
            }
            Err(e) => {
                warn!("Reloaded index rejected: {e}");
                Err(e)
            }
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|meta| meta.modified().ok())
}
