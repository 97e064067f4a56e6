//! History, draft and last-applied storage
//!
//! All three live in one JSON document that is read whole and rewritten whole. Writes go to a
//! temporary file in the same directory which is then renamed over the old document.

use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;

use crate::wallpaper::error::WallpaperError;
use crate::wallpaper::models::{GoalsDraft, HistoryEntry, PersistenceEnvelope};

pub trait WallpaperPersistence: Send + Sync {
    fn load_envelope(&self) -> Result<PersistenceEnvelope, WallpaperError>;

    fn save_envelope(&self, envelope: &PersistenceEnvelope) -> Result<(), WallpaperError>;

    #[cfg(test)]
    fn load_history(&self) -> Result<Vec<HistoryEntry>, WallpaperError> {
        Ok(self.load_envelope()?.history)
    }

    fn save_history(&self, entries: &[HistoryEntry]) -> Result<(), WallpaperError> {
        let mut envelope = self.load_envelope()?;
        envelope.history = entries.to_vec();
        self.save_envelope(&envelope)
    }

    #[cfg(test)]
    fn load_goals_draft(&self) -> Result<GoalsDraft, WallpaperError> {
        Ok(self.load_envelope()?.goals_draft)
    }

    fn save_goals_draft(&self, draft: &GoalsDraft) -> Result<(), WallpaperError> {
        let mut envelope = self.load_envelope()?;
        envelope.goals_draft = draft.clone();
        self.save_envelope(&envelope)
    }

    #[cfg(test)]
    fn load_last_applied(&self) -> Result<Option<PathBuf>, WallpaperError> {
        Ok(self.load_envelope()?.last_applied_path)
    }

    fn save_last_applied(&self, path: Option<&Path>) -> Result<(), WallpaperError> {
        let mut envelope = self.load_envelope()?;
        envelope.last_applied_path = path.map(Path::to_path_buf);
        self.save_envelope(&envelope)
    }
}

/// `state.json` on disk
#[derive(Debug, Clone)]
pub struct FileWallpaperPersistence {
    path: PathBuf,
}

impl FileWallpaperPersistence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> Result<&Path, WallpaperError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .map_err(|e| WallpaperError::persistence("createDirectory", e))?;
        Ok(parent)
    }
}

impl WallpaperPersistence for FileWallpaperPersistence {
    fn load_envelope(&self) -> Result<PersistenceEnvelope, WallpaperError> {
        if !self.path.exists() {
            return Ok(PersistenceEnvelope::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| WallpaperError::persistence("loadState", e))?;
        serde_json::from_str(&contents).map_err(|e| WallpaperError::persistence("loadState", e))
    }

    fn save_envelope(&self, envelope: &PersistenceEnvelope) -> Result<(), WallpaperError> {
        let parent = self.parent_dir()?;
        let json = serde_json::to_string_pretty(envelope)
            .map_err(|e| WallpaperError::persistence("saveState", e))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| WallpaperError::persistence("saveState", e))?;
        temp.write_all(json.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| WallpaperError::persistence("saveState", e))?;
        temp.persist(&self.path)
            .map_err(|e| WallpaperError::persistence("saveState", e.error))?;
        Ok(())
    }
}

/// Process-local storage for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct InMemoryWallpaperPersistence {
    envelope: Mutex<PersistenceEnvelope>,
}

#[cfg(test)]
impl WallpaperPersistence for InMemoryWallpaperPersistence {
    fn load_envelope(&self) -> Result<PersistenceEnvelope, WallpaperError> {
        self.envelope
            .lock()
            .map(|envelope| envelope.clone())
            .map_err(|e| WallpaperError::persistence("loadState", e))
    }

    fn save_envelope(&self, envelope: &PersistenceEnvelope) -> Result<(), WallpaperError> {
        let mut stored = self
            .envelope
            .lock()
            .map_err(|e| WallpaperError::persistence("saveState", e))?;
        *stored = envelope.clone();
        Ok(())
    }
}
