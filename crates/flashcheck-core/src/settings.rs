//! Persistent user settings for flashcheck
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux: `~/.config/flashcheck/flashcheck_config.toml`
//! - macOS: `~/Library/Application Support/flashcheck/flashcheck_config.toml`
//! - Windows: `%APPDATA%\flashcheck\flashcheck_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [speed]
//! block_size = "10M"
//! iterations = 5
//!
//! [integrity]
//! file_size = "1M"
//! files_per_pattern = 3
//! algorithm = "sha256"
//!
//! [capacity]
//! fast_max_size = "1G"
//! sync_interval = "64M"
//!
//! [behavior]
//! skip_confirmation = false
//! delete_temp_files = true
//! restore_after_test = true
//!
//! [report]
//! enabled = true
//! ```

use crate::config::TestConfig;
use crate::digest::DigestAlgorithm;
use crate::pattern::TestPattern;
use crate::units::parse_size;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "flashcheck_config.toml";

/// Application name for config directory
const APP_NAME: &str = "flashcheck";

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Speed probe settings
    pub speed: SpeedSettings,

    /// Integrity check settings
    pub integrity: IntegritySettings,

    /// Capacity check settings
    pub capacity: CapacitySettings,

    /// Behavior settings
    pub behavior: BehaviorSettings,

    /// Report export settings
    pub report: ReportSettings,
}

/// Settings for the speed probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeedSettings {
    /// Sequential block size (e.g., "10M", "4M")
    pub block_size: String,

    /// Sequential trials to average
    pub iterations: u32,

    /// Pause between trials in milliseconds
    pub trial_pause_ms: u64,

    /// Random-offset operations per direction
    pub random_ops: u32,

    /// Single-byte reads used for access time
    pub access_samples: u32,
}

/// Settings for the integrity check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntegritySettings {
    /// Size of each test file (e.g., "1M")
    pub file_size: String,

    /// Files written per pattern
    pub files_per_pattern: u32,

    /// Patterns to test, by name
    pub patterns: Vec<String>,

    /// Digest algorithm (sha256 or sha512)
    pub algorithm: String,
}

/// Settings for the capacity check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CapacitySettings {
    /// Block size in fast mode
    pub fast_block_size: String,

    /// Block size in full mode
    pub full_block_size: String,

    /// Upper bound on bytes written in fast mode
    pub fast_max_size: String,

    /// Share of free space used in fast mode
    pub fast_fraction: f64,

    /// Share of free space used in full mode
    pub full_fraction: f64,

    /// Bytes written between fsync calls
    pub sync_interval: String,
}

/// General behavior settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorSettings {
    /// Whether to skip confirmation prompts by default
    pub skip_confirmation: bool,

    /// Whether to suppress non-error output
    pub quiet: bool,

    /// Remove test artifacts from the drive after each phase
    pub delete_temp_files: bool,

    /// Reformat the drive after destructive tests
    pub restore_after_test: bool,

    /// Seconds to wait for the format command
    pub format_timeout_secs: u64,
}

/// Settings for report export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportSettings {
    /// Write reports after each run
    pub enabled: bool,

    /// Reports directory; the platform data dir is used when unset
    pub directory: Option<PathBuf>,
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            block_size: "10M".to_string(),
            iterations: 5,
            trial_pause_ms: 100,
            random_ops: 10,
            access_samples: 100,
        }
    }
}

impl Default for IntegritySettings {
    fn default() -> Self {
        Self {
            file_size: "1M".to_string(),
            files_per_pattern: 3,
            patterns: TestPattern::all()
                .iter()
                .map(|p| p.name().to_string())
                .collect(),
            algorithm: "sha256".to_string(),
        }
    }
}

impl Default for CapacitySettings {
    fn default() -> Self {
        Self {
            fast_block_size: "1M".to_string(),
            full_block_size: "100M".to_string(),
            fast_max_size: "1G".to_string(),
            fast_fraction: 0.10,
            full_fraction: 0.90,
            sync_interval: "64M".to_string(),
        }
    }
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            skip_confirmation: false,
            quiet: false,
            delete_temp_files: true,
            restore_after_test: true,
            format_timeout_secs: 120,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => {
                    tracing::debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save settings to the configuration file
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        self.save_to_path(Self::config_path())
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the configuration directory
    pub fn config_dir() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME))
    }

    /// Check if a configuration file exists
    pub fn config_exists() -> bool {
        Self::config_path().is_some_and(|p| p.exists())
    }

    /// Generate a default configuration file content as a string
    pub fn default_config_string() -> String {
        let default = Self::default();
        toml::to_string_pretty(&default)
            .unwrap_or_else(|_| String::from("# Failed to generate default config"))
    }

    /// Reports directory: the configured one or the platform default
    pub fn report_dir(&self) -> Option<PathBuf> {
        self.report
            .directory
            .clone()
            .or_else(crate::report::default_report_dir)
    }

    /// Convert to a validated runtime configuration
    pub fn to_test_config(&self) -> Result<TestConfig, SettingsError> {
        let size = |field: &str, value: &str| {
            parse_size(value).map_err(|e| SettingsError::Invalid(format!("{}: {}", field, e)))
        };
        let usize_size = |field: &str, value: &str| {
            size(field, value).and_then(|n| {
                usize::try_from(n)
                    .map_err(|_| SettingsError::Invalid(format!("{}: {} is too large", field, value)))
            })
        };

        let patterns = self
            .integrity
            .patterns
            .iter()
            .map(|name| name.parse::<TestPattern>())
            .collect::<crate::Result<Vec<_>>>()
            .map_err(|e| SettingsError::Invalid(format!("integrity.patterns: {}", e)))?;

        let algorithm: DigestAlgorithm = self
            .integrity
            .algorithm
            .parse()
            .map_err(|e| SettingsError::Invalid(format!("integrity.algorithm: {}", e)))?;

        let mut config = TestConfig::new()
            .speed_block_size(usize_size("speed.block_size", &self.speed.block_size)?)
            .speed_iterations(self.speed.iterations)
            .trial_pause(Duration::from_millis(self.speed.trial_pause_ms))
            .random_ops(self.speed.random_ops)
            .access_samples(self.speed.access_samples)
            .integrity_file_size(usize_size("integrity.file_size", &self.integrity.file_size)?)
            .files_per_pattern(self.integrity.files_per_pattern)
            .patterns(patterns)
            .digest_algorithm(algorithm)
            .fast_block_size(usize_size(
                "capacity.fast_block_size",
                &self.capacity.fast_block_size,
            )?)
            .full_block_size(usize_size(
                "capacity.full_block_size",
                &self.capacity.full_block_size,
            )?)
            .fast_max_bytes(size("capacity.fast_max_size", &self.capacity.fast_max_size)?)
            .sync_interval(size("capacity.sync_interval", &self.capacity.sync_interval)?)
            .delete_temp_files(self.behavior.delete_temp_files)
            .restore_after_test(self.behavior.restore_after_test)
            .format_timeout(Duration::from_secs(self.behavior.format_timeout_secs));
        config.fast_fraction = self.capacity.fast_fraction;
        config.full_fraction = self.capacity.full_fraction;

        config
            .validate()
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;
        Ok(config)
    }
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),

    /// Failed to deserialize settings
    #[error("Failed to parse settings: {0}")]
    Deserialize(toml::de::Error),

    /// A value could not be turned into a test configuration
    #[error("Invalid setting {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{GIB, MIB};
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.speed.block_size, "10M");
        assert_eq!(settings.speed.iterations, 5);
        assert_eq!(settings.integrity.file_size, "1M");
        assert_eq!(settings.integrity.patterns.len(), 5);
        assert_eq!(settings.integrity.algorithm, "sha256");
        assert_eq!(settings.capacity.fast_max_size, "1G");
        assert!(!settings.behavior.skip_confirmation);
        assert!(settings.behavior.delete_temp_files);
        assert!(settings.behavior.restore_after_test);
        assert!(settings.report.enabled);
        assert!(settings.report.directory.is_none());
    }

    #[test]
    fn test_defaults_match_test_config() {
        let config = Settings::default().to_test_config().unwrap();
        let expected = TestConfig::default();
        assert_eq!(config.speed_block_size, expected.speed_block_size);
        assert_eq!(config.speed_iterations, expected.speed_iterations);
        assert_eq!(config.trial_pause, expected.trial_pause);
        assert_eq!(config.integrity_file_size, expected.integrity_file_size);
        assert_eq!(config.patterns, expected.patterns);
        assert_eq!(config.fast_block_size, expected.fast_block_size);
        assert_eq!(config.full_block_size, expected.full_block_size);
        assert_eq!(config.fast_max_bytes, GIB);
        assert_eq!(config.sync_interval, 64 * MIB);
        assert_eq!(config.format_timeout, expected.format_timeout);
    }

    #[test]
    fn test_settings_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("flashcheck_config.toml");

        let mut settings = Settings::default();
        settings.speed.block_size = "4M".to_string();
        settings.integrity.algorithm = "sha512".to_string();
        settings.integrity.patterns = vec!["random".to_string()];
        settings.capacity.fast_fraction = 0.05;
        settings.behavior.skip_confirmation = true;
        settings.report.directory = Some(PathBuf::from("/srv/reports"));

        settings.save_to_path(Some(config_path.clone())).unwrap();
        assert!(config_path.exists());

        let loaded = Settings::load_from_path(Some(config_path));
        assert_eq!(settings, loaded);
        assert_eq!(loaded.report_dir(), Some(PathBuf::from("/srv/reports")));
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("flashcheck_config.toml");

        std::fs::write(
            &config_path,
            r#"
[capacity]
fast_max_size = "256M"
"#,
        )
        .unwrap();

        let settings = Settings::load_from_path(Some(config_path));
        assert_eq!(settings.capacity.fast_max_size, "256M");
        assert_eq!(settings.capacity.fast_block_size, "1M");
        assert_eq!(settings.speed.iterations, 5);

        let config = settings.to_test_config().unwrap();
        assert_eq!(config.fast_max_bytes, 256 * MIB);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut settings = Settings::default();
        settings.speed.block_size = "lots".to_string();
        let err = settings.to_test_config().unwrap_err();
        assert!(err.to_string().contains("speed.block_size"));

        let mut settings = Settings::default();
        settings.integrity.patterns = vec!["stripes".to_string()];
        assert!(matches!(
            settings.to_test_config(),
            Err(SettingsError::Invalid(_))
        ));

        let mut settings = Settings::default();
        settings.capacity.full_fraction = 1.5;
        assert!(settings.to_test_config().is_err());

        let mut settings = Settings::default();
        settings.integrity.algorithm = "md5".to_string();
        assert!(settings.to_test_config().is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let settings =
            Settings::load_from_path(Some(PathBuf::from("/nonexistent/flashcheck_config.toml")));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("flashcheck_config.toml");
        std::fs::write(&config_path, "this is not valid toml {{{{").unwrap();

        let settings = Settings::load_from_path(Some(config_path));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_default_config_string() {
        let config_str = Settings::default_config_string();
        for section in ["[speed]", "[integrity]", "[capacity]", "[behavior]", "[report]"] {
            assert!(config_str.contains(section), "missing {section}");
        }
        assert!(config_str.contains("sync_interval"));
    }

    #[test]
    fn test_config_path() {
        if let Some(p) = Settings::config_path() {
            assert!(p.to_string_lossy().contains("flashcheck"));
            assert!(p.ends_with("flashcheck/flashcheck_config.toml"));
        }
    }

    #[test]
    fn test_save_to_none_path() {
        let result = Settings::default().save_to_path(None);
        assert!(matches!(result, Err(SettingsError::NoConfigDir)));
    }

    #[test]
    fn test_settings_error_display() {
        let io_err = SettingsError::Io {
            path: PathBuf::from("/test/path"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(io_err.to_string().contains("/test/path"));
        assert!(SettingsError::NoConfigDir
            .to_string()
            .contains("configuration directory"));
    }
}
