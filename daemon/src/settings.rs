//! Persisted user state: the wallpaper folder, the chosen interval and the
//! names of images already shown.
//!
//! The controller receives a [`SettingsStore`] and writes back after every
//! mutation, so a crash never loses more than the rotation in flight.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Values that survive a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Last wallpaper folder entered
    #[serde(default)]
    pub path: Option<String>,

    /// Index into `common::INTERVAL_OPTIONS`
    #[serde(default = "default_interval")]
    pub selected_interval: usize,

    /// File names already shown, oldest first
    #[serde(default)]
    pub seen: Vec<String>,
}

fn default_interval() -> usize {
    common::DEFAULT_INTERVAL_INDEX
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path: None,
            selected_interval: default_interval(),
            seen: Vec::new(),
        }
    }
}

/// Persistence backend for [`Settings`]
pub trait SettingsStore: Send {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Stores settings as pretty-printed JSON in a single file
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_DATA_HOME/paperswitcher/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join("paperswitcher");

        Ok(data_dir.join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            log::info!(
                "No saved settings at {}, starting fresh",
                self.path.display()
            );
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings: {}", self.path.display()))?;

        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings: {}", self.path.display()))?;

        log::debug!(
            "Loaded settings: folder {:?}, interval #{}, {} seen",
            settings.path,
            settings.selected_interval,
            settings.seen.len()
        );

        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("Settings path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        // Write next to the target and rename so a crash never leaves half a file
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, settings)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write settings: {}", self.path.display()))?;

        log::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store whose clones share one value
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: std::sync::Arc<std::sync::Mutex<Settings>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn snapshot(&self) -> Settings {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Settings> {
        Ok(self.snapshot())
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        *self.inner.lock().unwrap() = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));

        let settings = store.load().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.selected_interval, common::DEFAULT_INTERVAL_INDEX);
    }

    #[test]
    fn test_seen_set_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("settings.json"));

        let settings = Settings {
            path: Some("/home/me/walls".to_string()),
            selected_interval: 7,
            seen: vec!["c.jpg".into(), "a.jpg".into(), "b.png".into()],
        };
        store.save(&settings).unwrap();

        let loaded = store.load().unwrap();
        let expected: HashSet<_> = settings.seen.iter().collect();
        let actual: HashSet<_> = loaded.seen.iter().collect();
        assert_eq!(expected, actual);
        assert_eq!(loaded.path.as_deref(), Some("/home/me/walls"));
        assert_eq!(loaded.selected_interval, 7);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "path": "/walls" }"#).unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(loaded.path.as_deref(), Some("/walls"));
        assert_eq!(loaded.selected_interval, common::DEFAULT_INTERVAL_INDEX);
        assert!(loaded.seen.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        assert!(JsonFileStore::new(&path).load().is_err());
    }
}
