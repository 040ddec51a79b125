// Per-file read offsets, persisted between runs
//
// The state file is a JSON object mapping absolute paths to byte
// offsets. Saves go through a sibling .tmp file plus rename so a crash
// never leaves a half-written file behind.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// absolute path -> byte offset already shipped
pub type FileProcessState = BTreeMap<String, u64>;

#[derive(Error, Debug)]
pub enum FileStateError {
    #[error("state file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid json: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub struct FileStateManager {
    file_path: PathBuf,
    lock: RwLock<()>,
}

impl FileStateManager {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn state_file_path(&self) -> &Path {
        &self.file_path
    }

    /// Missing or empty state file means a fresh start, not an error.
    pub async fn load(&self) -> Result<FileProcessState, FileStateError> {
        let _guard = self.lock.read().await;

        let data = match tokio::fs::read(&self.file_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(file = %self.file_path.display(), "State file not found, starting fresh");
                return Ok(FileProcessState::new());
            }
            Err(e) => {
                error!(error = %e, file = %self.file_path.display(), "Failed to read state file");
                return Err(e.into());
            }
        };

        if data.is_empty() {
            warn!(file = %self.file_path.display(), "State file is empty, starting fresh");
            return Ok(FileProcessState::new());
        }

        let state: FileProcessState = serde_json::from_slice(&data)?;
        debug!(file = %self.file_path.display(), files_tracked = state.len(), "Loaded file state");
        Ok(state)
    }

    /// Atomic save: write <path>.tmp, rename over the target. The tmp
    /// file is removed again if the rename fails.
    pub async fn save(&self, state: &FileProcessState) -> Result<(), FileStateError> {
        let _guard = self.lock.write().await;

        let data = serde_json::to_vec_pretty(state)?;

        let mut tmp_path = self.file_path.as_os_str().to_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        tokio::fs::write(&tmp_path, &data).await?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.file_path).await {
            error!(from = %tmp_path.display(), to = %self.file_path.display(), error = %e, "Failed to rename state file");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(file = %self.file_path.display(), files_tracked = state.len(), "Saved file state");
        Ok(())
    }
}
