use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// Settings for the alert core, persisted in settings.json.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Discreet cancellation phrase, compared case-insensitively
    #[serde(default = "default_safe_word")]
    pub safe_word: String,
    /// Seconds counted down before an armed alert dispatches
    #[serde(default = "default_countdown_ticks")]
    pub countdown_ticks: u32,
    /// Length of a recorded audio snippet in seconds
    #[serde(default = "default_audio_snippet_seconds")]
    pub audio_snippet_seconds: u64,
    /// Prepared messages offered for one-tap selection
    #[serde(default = "default_quick_messages")]
    pub quick_messages: Vec<String>,
}

fn default_safe_word() -> String {
    "ubuntu".to_string()
}

fn default_countdown_ticks() -> u32 {
    5
}

fn default_audio_snippet_seconds() -> u64 {
    10
}

fn default_quick_messages() -> Vec<String> {
    [
        "I need help immediately.",
        "I am in a dangerous situation.",
        "Please call authorities for me.",
        "Track my location now.",
    ]
    .iter()
    .map(|msg| (*msg).to_string())
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            safe_word: default_safe_word(),
            countdown_ticks: default_countdown_ticks(),
            audio_snippet_seconds: default_audio_snippet_seconds(),
            quick_messages: default_quick_messages(),
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            if let Ok(content) = fs::read_to_string(&self.config_path) {
                if let Ok(settings) = serde_json::from_str(&content) {
                    return settings;
                }
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.safe_word, "ubuntu");
        assert_eq!(settings.countdown_ticks, 5);
        assert_eq!(settings.audio_snippet_seconds, 10);
        assert_eq!(settings.quick_messages.len(), 4);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let default = manager.load();
        assert_eq!(default.countdown_ticks, 5);

        let new_settings = Settings {
            safe_word: "harambe".to_string(),
            countdown_ticks: 10,
            audio_snippet_seconds: 30,
            quick_messages: vec!["Call me.".to_string()],
        };

        manager.save(&new_settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded.safe_word, "harambe");
        assert_eq!(loaded.countdown_ticks, 10);
        assert_eq!(loaded.quick_messages, vec!["Call me.".to_string()]);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{not json").unwrap();

        let manager = ConfigManager::new(dir.path().to_path_buf());
        let settings = manager.load();
        assert_eq!(settings.safe_word, "ubuntu");
    }

    #[test]
    fn test_partial_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), r#"{"safe_word":"opal"}"#).unwrap();

        let manager = ConfigManager::new(dir.path().to_path_buf());
        let settings = manager.load();
        assert_eq!(settings.safe_word, "opal");
        assert_eq!(settings.countdown_ticks, 5);
        assert_eq!(settings.quick_messages.len(), 4);
    }
}
