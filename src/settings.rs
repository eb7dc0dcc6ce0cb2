use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::metrics::LayoutTuning;
use crate::pagination::PaginationTuning;
use crate::session::SessionConfig;
use crate::transition::TransitionTuning;
use crate::voice::SpeechParams;

pub const CURRENT_VERSION: u32 = 2;
const SETTINGS_FILENAME: &str = "config.yaml";
const STORAGE_FILENAME: &str = "reader.json";
const APP_NAME: &str = "pageturn";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub enabled: bool,
    pub program: String,
    /// Placeholders: `{rate_wpm}`, `{pitch}`, `{volume}`, `{language}`.
    pub args: Vec<String>,
    #[serde(flatten)]
    pub params: SpeechParams,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "espeak-ng".to_string(),
            args: ["-s", "{rate_wpm}", "-p", "{pitch}", "-a", "{volume}", "-v{language}"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
            params: SpeechParams::default(),
        }
    }
}

/// Pixel size of one terminal cell, used to map the terminal grid onto the
/// layout's px units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    pub cell_width_px: f32,
    pub cell_height_px: f32,
    pub tick_ms: u64,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            cell_width_px: 10.0,
            cell_height_px: 20.0,
            tick_ms: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub layout: LayoutTuning,

    #[serde(default)]
    pub pagination: PaginationTuning,

    #[serde(default)]
    pub transition: TransitionTuning,

    #[serde(default)]
    pub speech: SpeechSettings,

    #[serde(default)]
    pub terminal: TerminalSettings,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            layout: LayoutTuning::default(),
            pagination: PaginationTuning::default(),
            transition: TransitionTuning::default(),
            speech: SpeechSettings::default(),
            terminal: TerminalSettings::default(),
        }
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Where reading progress and preferences live unless a data dir is given.
pub fn default_storage_path(data_dir: Option<&Path>) -> Option<PathBuf> {
    match data_dir {
        Some(dir) => Some(dir.join(STORAGE_FILENAME)),
        None => dirs::data_dir().map(|data| data.join(APP_NAME).join(STORAGE_FILENAME)),
    }
}

impl Settings {
    /// Reads the settings file, creating it with defaults when missing.
    /// Unreadable files are logged and replaced by defaults in memory only.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match preferred_config_path() {
                Some(path) => path,
                None => {
                    warn!("Could not determine config directory, using default settings");
                    return Self::default();
                }
            },
        };

        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Self::default();
            save_settings_to_file(&settings, &path);
            return settings;
        }

        load_settings_from_path(&path).unwrap_or_default()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            layout: self.layout,
            pagination: self.pagination,
            transition: self.transition,
            speech: self.speech.params.clone(),
        }
    }
}

fn load_settings_from_path(path: &Path) -> Option<Settings> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                Some(settings)
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                None
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            None
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // v1 stored the width-mismatch ratio as a percentage.
    if settings.version < 2 && settings.pagination.mismatch_ratio > 1.0 {
        settings.pagination.mismatch_ratio /= 100.0;
    }

    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let body = match serde_yaml::to_string(settings) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };
    let content = format!("{SETTINGS_HEADER}{body}");

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# pageturn settings
# ============================================================================
# layout:      frame inset, flow padding and column gap clamp, in px
# pagination:  overflow tolerance and width-mismatch correction thresholds
# transition:  page turn duration at speed 1.0 and buffer reveal timing, in ms
# speech:      TTS command; args may use {rate_wpm} {pitch} {volume} {language}
# terminal:    px size of one terminal cell and the UI tick interval
#
"#;
