//! Persisted application settings.
//!
//! Stored as JSON at `<config dir>/dikta/config.json`. Unknown or missing
//! fields fall back to defaults, so upgrades never invalidate an existing
//! file.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::registry;

/// Hotkey binding: modifier names plus a key name, all lowercase
/// ("ctrl", "shift", "alt", "super"; "space", "f1", "a"...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyConfig {
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            modifiers: vec!["ctrl".into(), "shift".into()],
            key: "space".into(),
        }
    }
}

impl fmt::Display for HotkeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{m}+")?;
        }
        f.write_str(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_correction_model")]
    pub model_id: String,
}

fn default_correction_model() -> String {
    registry::default_correction_model_id().to_string()
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_id: default_correction_model(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Recognition language: ISO 639-1 code, or "auto".
    pub language: String,
    pub ui_language: String,
    pub notifications: bool,
    pub hotkey: HotkeyConfig,
    /// Active recognition model.
    pub model_id: String,
    pub correction: CorrectionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: "auto".into(),
            ui_language: "en".into(),
            notifications: true,
            hotkey: HotkeyConfig::default(),
            model_id: registry::default_model_id().to_string(),
            correction: CorrectionConfig::default(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dikta")
            .join("config.json")
    }

    /// Load from the default location; a missing or unreadable file yields
    /// defaults.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Language hint for the recognizer; `None` means auto-detect.
    pub fn recognition_language(&self) -> Option<&str> {
        match self.language.as_str() {
            "" | "auto" => None,
            lang => Some(lang),
        }
    }
}
