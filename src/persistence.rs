//! Settings file persistence
//!
//! Loading is fail-soft: a missing, empty or unparsable file yields the
//! default snapshot and a log line. Saving and deleting are fail-loud: I/O
//! errors are returned to the caller.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::constants::storage;
use crate::error::SettingsError;
use crate::snapshot::{self, SettingsSnapshot};

/// Storage boundary used by the coordinator
#[async_trait]
pub trait SettingsPersistence: Send + Sync {
    /// Read the stored snapshot, or a fresh default on any failure
    async fn load(&self) -> SettingsSnapshot;

    /// Stamp `last_saved_at` and write the snapshot
    async fn save(&self, snapshot: SettingsSnapshot) -> Result<(), SettingsError>;

    /// Remove the stored snapshot; absent is success
    async fn delete(&self) -> Result<(), SettingsError>;

    fn exists(&self) -> bool;

    /// Size of the stored snapshot, 0 if absent
    fn file_size_bytes(&self) -> u64;

    fn path(&self) -> &Path;
}

/// JSON file repository at a fixed path
#[derive(Debug, Clone)]
pub struct UserSettingsRepository {
    path: PathBuf,
}

impl UserSettingsRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = %path.display(), "Settings file path");
        Self { path }
    }

    /// Repository for `user_settings.json` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(crate::config::settings_file_in(dir.as_ref()))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(storage::FILENAME));
        name.push(".");
        name.push(storage::TEMP_SUFFIX);
        self.path.with_file_name(name)
    }

    /// Drop a temp file left behind by an interrupted save
    async fn remove_stale_temp(&self) {
        let temp = self.temp_path();
        match fs::remove_file(&temp).await {
            Ok(()) => warn!(path = %temp.display(), "Removed leftover temp settings file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!(path = %temp.display(), error = %e, "Failed to remove temp settings file"),
        }
    }
}

/// Deletes the temp file on drop unless the save completed
///
/// Covers save futures that are dropped mid-write as well as error returns.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed temp settings file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), error = %e, "Failed to remove temp settings file"),
        }
    }
}

#[async_trait]
impl SettingsPersistence for UserSettingsRepository {
    async fn load(&self) -> SettingsSnapshot {
        self.remove_stale_temp().await;

        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Settings file not found, using defaults");
                return SettingsSnapshot::default();
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to read settings file, using defaults");
                return SettingsSnapshot::default();
            }
        };

        if contents.trim().is_empty() {
            warn!(path = %self.path.display(), "Settings file is empty, using defaults");
            return SettingsSnapshot::default();
        }

        match snapshot::parse(&contents) {
            Ok(loaded) => {
                info!(path = %self.path.display(), version = loaded.version, "Loaded settings");
                loaded
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to parse settings file, using defaults");
                SettingsSnapshot::default()
            }
        }
    }

    async fn save(&self, snapshot: SettingsSnapshot) -> Result<(), SettingsError> {
        snapshot::validate(&snapshot)?;
        let mut snapshot = snapshot;
        snapshot.stamp_now();
        let contents = snapshot::to_json(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SettingsError::io("create directory for", parent, e))?;
        }

        // Target is only ever replaced by a complete file
        let temp = TempFileGuard::new(self.temp_path());
        fs::write(temp.path(), contents)
            .await
            .map_err(|e| SettingsError::io("write", temp.path(), e))?;

        if let Err(e) = fs::rename(temp.path(), &self.path).await {
            error!(path = %self.path.display(), error = %e, "Failed to save settings");
            return Err(SettingsError::io("replace", &self.path, e));
        }
        temp.disarm();

        info!(path = %self.path.display(), last_saved_at = snapshot.last_saved_at, "Saved settings");
        Ok(())
    }

    async fn delete(&self) -> Result<(), SettingsError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Deleted settings file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No settings file to delete");
                Ok(())
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to delete settings file");
                Err(SettingsError::io("delete", &self.path, e))
            }
        }
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn file_size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path)
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
