// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistent key-value settings (provider API keys, feature flags).

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Key of the persisted mock-mode flag
pub const MOCK_MODE_KEY: &str = "mock_mode";

/// Settings store error
#[derive(Debug, Error)]
pub enum SettingsError {
    /// File could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File content is not a RON map
    #[error("Invalid settings file: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be serialized
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] ron::Error),
}

/// String-to-string settings, optionally backed by a RON file.
///
/// Every write is persisted immediately when a file is attached.
#[derive(Debug, Default)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, String>>,
}

impl SettingsStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => ron::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(path = %path.display(), entries = values.len(), "Opened settings");
        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
        })
    }

    /// Read a value
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    /// Write a value
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), SettingsError> {
        self.values.write().insert(key.into(), value.into());
        self.persist()
    }

    /// Remove a value; returns whether it existed
    pub fn remove(&self, key: &str) -> Result<bool, SettingsError> {
        let existed = self.values.write().remove(key).is_some();
        if existed {
            self.persist()?;
        }
        Ok(existed)
    }

    /// Non-blank API key stored under `key`
    pub fn api_key(&self, key: &str) -> Option<String> {
        self.get(key).filter(|value| !value.trim().is_empty())
    }

    /// Persisted mock-mode flag, if one was saved
    pub fn mock_mode(&self) -> Option<bool> {
        self.get(MOCK_MODE_KEY).and_then(|value| value.parse().ok())
    }

    /// Persist the mock-mode flag
    pub fn set_mock_mode(&self, enabled: bool) -> Result<(), SettingsError> {
        self.set(MOCK_MODE_KEY, enabled.to_string())
    }

    fn persist(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = {
            let values = self.values.read();
            ron::ser::to_string_pretty(&*values, ron::ser::PrettyConfig::default())?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }
}
