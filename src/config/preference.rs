//! Persisted realtime toggle.
//!
//! A single boolean remembered across sessions. Read once when the stream is
//! built, written whenever the user flips it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub trait RealtimePreference: Send {
    /// `None` when the user never chose
    fn read(&self) -> Option<bool>;

    fn write(&mut self, value: bool) -> Result<()>;
}

/// Preference kept for the lifetime of the process only
#[derive(Debug, Clone, Default)]
pub struct MemoryPreference {
    value: Option<bool>,
}

impl MemoryPreference {
    pub fn new(value: Option<bool>) -> Self {
        Self { value }
    }
}

impl RealtimePreference for MemoryPreference {
    fn read(&self) -> Option<bool> {
        self.value
    }

    fn write(&mut self, value: bool) -> Result<()> {
        self.value = Some(value);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreferenceFile {
    realtime_active: bool,
    updated_at: DateTime<Utc>,
}

/// Preference stored as a small JSON file in the config directory
#[derive(Debug, Clone)]
pub struct FilePreference {
    path: PathBuf,
}

impl FilePreference {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RealtimePreference for FilePreference {
    fn read(&self) -> Option<bool> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<PreferenceFile>(&content) {
            Ok(file) => Some(file.realtime_active),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable preference file {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn write(&mut self, value: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = PreferenceFile {
            realtime_active: value,
            updated_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write preference to {}", self.path.display()))
    }
}

/// Realtime defaults to on while the project is still waiting for its
/// first event, so the first issue shows up without a reload.
pub fn initial_realtime(preference: &dyn RealtimePreference, has_first_event: bool) -> bool {
    preference.read().unwrap_or(!has_first_event)
}
