use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analysis::CheckOptions;
use crate::eval::EvalOptions;
use crate::infrastructure::logging::{LogConfig, LogFormat, LogOutput};

/// File name looked up by [`Config::discover`]
pub const CONFIG_FILE: &str = "livedoc.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub eval: EvalConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_100")]
    pub max_errors: usize,

    #[serde(default = "default_true")]
    pub suggestions: bool,

    #[serde(default = "default_false")]
    pub allow_unannotated_params: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_true")]
    pub fuse_maps: bool,

    #[serde(default = "default_true")]
    pub write_back: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatName,

    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatName {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            max_errors: 100,
            suggestions: true,
            allow_unannotated_params: false,
        }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self { fuse_maps: true, write_back: true }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, capacity: 1024 }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatName::default(),
            filter: None,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_100() -> usize { 100 }
fn default_capacity() -> usize { 1024 }
fn default_level() -> String { "info".to_string() }

impl CheckConfig {
    pub fn to_options(&self) -> CheckOptions {
        CheckOptions { allow_unannotated_params: self.allow_unannotated_params }
    }
}

impl EvalConfig {
    pub fn to_options(&self) -> EvalOptions {
        EvalOptions { fuse_maps: self.fuse_maps, write_back: self.write_back }
    }
}

impl LogSettings {
    /// Logging configuration writing to stderr.
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = self.level.parse()
            .map_err(|_| ConfigError::InvalidLevel(self.level.clone()))?;
        let format = match self.format {
            LogFormatName::Pretty => LogFormat::Pretty,
            LogFormatName::Compact => LogFormat::Compact,
            LogFormatName::Json => LogFormat::Json,
        };
        let mut config = LogConfig::new()
            .with_level(level)
            .with_format(format)
            .with_output(LogOutput::Stderr);
        if let Some(filter) = &self.filter {
            config = config.with_filter(filter.clone());
        }
        Ok(config)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Nearest `livedoc.toml` in `start` or one of its parents
    pub fn find(start: &Path) -> Option<PathBuf> {
        let mut current = Some(start);
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            current = dir.parent();
        }
        None
    }

    /// Find and load configuration from the current directory or its parents
    pub fn discover() -> Result<Self, ConfigError> {
        let Ok(cwd) = std::env::current_dir() else {
            return Ok(Self::default());
        };
        match Self::find(&cwd) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Generate default configuration file content
    pub fn generate_default() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.check.max_errors, 100);
        assert!(config.check.suggestions);
        assert!(!config.check.allow_unannotated_params);
        assert!(config.eval.fuse_maps);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[check]
max_errors = 5
allow_unannotated_params = true

[eval]
write_back = false

[log]
level = "debug"
format = "json"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.check.max_errors, 5);
        assert!(config.check.suggestions);
        assert!(config.check.to_options().allow_unannotated_params);
        assert!(!config.eval.to_options().write_back);
        assert!(config.eval.to_options().fuse_maps);
        assert_eq!(config.log.format, LogFormatName::Json);

        let log = config.log.to_log_config().unwrap();
        assert_eq!(log.level, tracing::Level::DEBUG);
        assert_eq!(log.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(Config::parse("[check"), Err(ConfigError::Parse(_))));
        let settings = LogSettings { level: "loud".into(), ..LogSettings::default() };
        assert!(matches!(settings.to_log_config(), Err(ConfigError::InvalidLevel(_))));
    }

    #[test]
    fn test_find_in_parent_directory() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "[cache]\ncapacity = 7\n").unwrap();

        let found = Config::find(&nested).unwrap();
        assert_eq!(found, temp.path().join(CONFIG_FILE));
        assert_eq!(Config::load(&found).unwrap().cache.capacity, 7);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);

        let mut config = Config::default();
        config.check.max_errors = 3;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
        assert!(Config::generate_default().unwrap().contains("[check]"));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
