//src/config.rs
use comfy_table::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use thiserror::Error;

use crate::backup::DEFAULT_UPDATE_SNAPSHOT_KEEP;
use crate::import::SUPPORTED_LOCALES;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_CONFIG_DIR: &str = "liftlog";
const CONFIG_ENV_VAR: &str = "LIFTLOG_CONFIG_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid color name: {0}")]
    InvalidColor(String),
    #[error("Invalid import locale '{0}' (expected one of: de, en)")]
    InvalidLocale(String),
    #[error("update_snapshot_keep must be at least 1")]
    InvalidSnapshotKeep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum StandardColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    DarkGrey,
    DarkRed,
    DarkGreen,
    DarkYellow,
    DarkBlue,
    DarkMagenta,
    DarkCyan,
    Grey,
}

impl From<StandardColor> for Color {
    fn from(value: StandardColor) -> Self {
        match value {
            StandardColor::Black => Self::Black,
            StandardColor::Red => Self::Red,
            StandardColor::Green => Self::Green,
            StandardColor::Yellow => Self::Yellow,
            StandardColor::Blue => Self::Blue,
            StandardColor::Magenta => Self::Magenta,
            StandardColor::Cyan => Self::Cyan,
            StandardColor::White => Self::White,
            StandardColor::DarkGrey => Self::DarkGrey,
            StandardColor::DarkRed => Self::DarkRed,
            StandardColor::DarkGreen => Self::DarkGreen,
            StandardColor::DarkYellow => Self::DarkYellow,
            StandardColor::DarkBlue => Self::DarkBlue,
            StandardColor::DarkMagenta => Self::DarkMagenta,
            StandardColor::DarkCyan => Self::DarkCyan,
            StandardColor::Grey => Self::Grey,
        }
    }
}

/// Case-insensitive color lookup by variant name ("darkgrey", "Green").
pub fn parse_color(color_str: &str) -> Result<StandardColor, ConfigError> {
    StandardColor::iter()
        .find(|color| format!("{color:?}").eq_ignore_ascii_case(color_str.trim()))
        .ok_or_else(|| ConfigError::InvalidColor(color_str.to_string()))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ThemeConfig {
    pub header_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            header_color: "Green".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Overrides the database location (the `LIFTLOG_DB_PATH` env var still wins).
    pub database_path: Option<PathBuf>,
    /// How many update safety snapshots are retained.
    pub update_snapshot_keep: usize,
    /// Locale recorded on imported plans that don't specify one.
    pub import_locale: String,
    pub theme: ThemeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            update_snapshot_keep: DEFAULT_UPDATE_SNAPSHOT_KEEP,
            import_locale: "en".to_string(),
            theme: ThemeConfig::default(),
        }
    }
}

impl Config {
    /// Checks values that serde cannot.
    ///
    /// # Errors
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_snapshot_keep == 0 {
            return Err(ConfigError::InvalidSnapshotKeep);
        }
        if !SUPPORTED_LOCALES.contains(&self.import_locale.as_str()) {
            return Err(ConfigError::InvalidLocale(self.import_locale.clone()));
        }
        parse_color(&self.theme.header_color)?;
        Ok(())
    }

    #[must_use]
    pub fn header_color(&self) -> Color {
        parse_color(&self.theme.header_color)
            .unwrap_or(StandardColor::Green)
            .into()
    }
}

/// Determines the path to the configuration file, creating its directory.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir_path = match std::env::var(CONFIG_ENV_VAR) {
        Ok(path_str) if !path_str.trim().is_empty() => PathBuf::from(path_str),
        _ => dirs::config_dir()
            .ok_or(ConfigError::CannotDetermineConfigDir)?
            .join(APP_CONFIG_DIR),
    };

    if !config_dir_path.exists() {
        tracing::debug!(path = %config_dir_path.display(), "Creating config directory");
        fs::create_dir_all(&config_dir_path)?;
    }

    Ok(config_dir_path.join(CONFIG_FILE_NAME))
}

/// Loads the configuration, writing the defaults when the file does not exist yet.
pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
    if !config_path.exists() {
        let default_config = Config::default();
        save(config_path, &default_config)?;
        return Ok(default_config);
    }
    let config_content = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&config_content)?;
    config.validate()?;
    Ok(config)
}

pub fn save(config_path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config)?;
    fs::write(config_path, config_content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colors_case_insensitively() {
        assert_eq!(parse_color("darkgrey").unwrap(), StandardColor::DarkGrey);
        assert_eq!(parse_color(" Green ").unwrap(), StandardColor::Green);
        assert!(matches!(parse_color("mauve"), Err(ConfigError::InvalidColor(_))));
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
        assert_eq!(load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "update_snapshot_keep = 5\n[theme]\nheader_color = \"Cyan\"\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.update_snapshot_keep, 5);
        assert_eq!(config.import_locale, "en");
        assert_eq!(config.header_color(), Color::Cyan);
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "update_snapshot_keep = 0\n").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::InvalidSnapshotKeep)));
        fs::write(&path, "import_locale = \"fr\"\n").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::InvalidLocale(_))));
    }
}
