//! Configuration file support for tracelens.
//!
//! Application-wide preferences (zoom defaults, live capture rate, logging)
//! are stored as versioned JSON. Per-session state lives in
//! [`crate::settings`] instead.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::live::{DEFAULT_FPS, MAX_FPS};
use crate::zoom::{DEFAULT_ZOOM_PERCENT, MAX_ZOOM_PERCENT, MIN_ZOOM_PERCENT};

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get the display name for this log level.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Get all log levels in order from least to most verbose.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
    }

    /// Parse a level name, case-insensitively.
    pub fn from_name(name: &str) -> Option<LogLevel> {
        Self::all()
            .iter()
            .copied()
            .find(|l| l.name().eq_ignore_ascii_case(name))
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Zoom applied when enhanced mode is switched on.
pub const DEFAULT_ENHANCED_ZOOM_PERCENT: u32 = 250;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Application name (for identification)
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// User preferences
    #[serde(default)]
    pub preferences: UserPreferences,
}

fn default_app_name() -> String {
    "tracelens".to_string()
}

/// User preferences section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Zoom for a freshly opened image and after leaving enhanced mode
    #[serde(default = "default_zoom")]
    pub default_zoom: u32,

    /// Zoom applied when enhanced mode is switched on
    #[serde(default = "default_enhanced_zoom")]
    pub enhanced_zoom: u32,

    /// Live capture frame rate
    #[serde(default = "default_live_fps")]
    pub live_fps: u32,

    /// Session settings file; the platform default when empty
    #[serde(default)]
    pub settings_file: String,

    /// Folder that relative export paths are resolved against; the working
    /// directory when empty
    #[serde(default)]
    pub export_folder: String,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_zoom() -> u32 {
    DEFAULT_ZOOM_PERCENT
}

fn default_enhanced_zoom() -> u32 {
    DEFAULT_ENHANCED_ZOOM_PERCENT
}

fn default_live_fps() -> u32 {
    DEFAULT_FPS
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            default_zoom: default_zoom(),
            enhanced_zoom: default_enhanced_zoom(),
            live_fps: default_live_fps(),
            settings_file: String::new(),
            export_folder: String::new(),
            log_level: LogLevel::default(),
        }
    }
}

impl UserPreferences {
    /// Bring out-of-range values back to something usable, logging each fix.
    pub fn sanitize(&mut self) {
        let zoom_range = MIN_ZOOM_PERCENT..=MAX_ZOOM_PERCENT;
        if !zoom_range.contains(&self.default_zoom) {
            log::warn!("Default zoom {}% out of range, using 100%", self.default_zoom);
            self.default_zoom = default_zoom();
        }
        if !zoom_range.contains(&self.enhanced_zoom) {
            log::warn!(
                "Enhanced zoom {}% out of range, using {}%",
                self.enhanced_zoom,
                DEFAULT_ENHANCED_ZOOM_PERCENT
            );
            self.enhanced_zoom = default_enhanced_zoom();
        }
        if !(1..=MAX_FPS).contains(&self.live_fps) {
            log::warn!("Unsupported live rate {} fps, using {}", self.live_fps, DEFAULT_FPS);
            self.live_fps = default_live_fps();
        }
    }

    /// Where an export named `output` should be written.
    pub fn export_path(&self, output: &Path) -> PathBuf {
        if self.export_folder.is_empty() || output.is_absolute() {
            output.to_path_buf()
        } else {
            Path::new(&self.export_folder).join(output)
        }
    }

    /// Custom session settings path, if one is configured.
    pub fn settings_path(&self) -> Option<PathBuf> {
        (!self.settings_file.is_empty()).then(|| PathBuf::from(&self.settings_file))
    }
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            app_name: default_app_name(),
            preferences: UserPreferences::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        config.preferences.sanitize();
        Ok(config)
    }

    /// Get the default filename for the config file.
    pub fn default_filename() -> &'static str {
        "tracelens-config.json"
    }

    /// Get the default config file path for auto-load/save.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("tracelens").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("tracelens")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load configuration from `path`.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load_from_path(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to the default path.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        self.save_to_path(&path)
    }

    /// Default session settings file, next to the config file.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn session_settings_path(&self) -> Option<PathBuf> {
        self.preferences.settings_path().or_else(|| {
            Self::default_path()
                .and_then(|p| p.parent().map(|dir| dir.join("tracelens-session.json")))
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.preferences.default_zoom, 100);
        assert_eq!(config.preferences.enhanced_zoom, 250);
        assert_eq!(config.preferences.live_fps, 60);
        assert_eq!(config.preferences.log_level, LogLevel::Info);
    }

    #[test]
    fn test_roundtrip_serialization() {
        let mut config = AppConfig::new();
        config.preferences.enhanced_zoom = 300;
        config.preferences.log_level = LogLevel::Debug;

        let json = config.to_json().unwrap();
        let loaded = AppConfig::from_json(&json).unwrap();
        assert_eq!(loaded.preferences, config.preferences);
    }

    #[test]
    fn test_version_too_new() {
        let json = r#"{"version": 999, "preferences": {}}"#;
        assert!(matches!(
            AppConfig::from_json(json),
            Err(ConfigError::VersionTooNew {
                file_version: 999,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let loaded = AppConfig::from_json(r#"{"version": 1}"#).unwrap();
        assert_eq!(loaded.app_name, "tracelens");
        assert_eq!(loaded.preferences, UserPreferences::default());
    }

    #[test]
    fn test_out_of_range_values_sanitized() {
        let json = r#"{"version": 1, "preferences": {"default_zoom": 5, "enhanced_zoom": 900, "live_fps": 0}}"#;
        let loaded = AppConfig::from_json(json).unwrap();
        assert_eq!(loaded.preferences, UserPreferences::default());
    }

    #[test]
    fn test_log_level_names() {
        assert_eq!(LogLevel::from_name("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_name("nope"), None);
        assert_eq!(LogLevel::Warn.to_level_filter(), log::LevelFilter::Warn);
    }

    #[test]
    fn test_export_and_settings_paths() {
        let mut prefs = UserPreferences::default();
        assert_eq!(prefs.export_path(Path::new("view.png")), PathBuf::from("view.png"));
        assert_eq!(prefs.settings_path(), None);

        prefs.export_folder = "/data/exports".to_string();
        prefs.settings_file = "/data/session.json".to_string();
        assert_eq!(
            prefs.export_path(Path::new("view.png")),
            PathBuf::from("/data/exports/view.png")
        );
        assert_eq!(
            prefs.export_path(Path::new("/tmp/view.png")),
            PathBuf::from("/tmp/view.png")
        );

        let config = AppConfig {
            preferences: prefs,
            ..AppConfig::new()
        };
        assert_eq!(
            config.session_settings_path(),
            Some(PathBuf::from("/data/session.json"))
        );
    }

    #[test]
    fn test_save_and_load_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::new();
        config.preferences.live_fps = 30;
        config.save_to_path(&path).unwrap();

        let loaded = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.preferences.live_fps, 30);
    }
}
