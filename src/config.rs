//! Configuration
//!
//! Loaded from a TOML file with `GRAPHEX_*` environment variable overrides.
//! Every field has a default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Evaluation and consolidation settings
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Align consolidated buckets to a multiple of the new step
    #[serde(default = "default_nudge")]
    pub nudge_start_time_on_aggregation: bool,

    /// Downsample results to at most this many points
    #[serde(default)]
    pub max_data_points: Option<usize>,

    /// Reducer given to fixtures that don't name one
    #[serde(default = "default_consolidation_func")]
    pub default_consolidation_func: String,

    #[serde(default)]
    pub default_x_files_factor: f32,
}

fn default_nudge() -> bool {
    true
}

fn default_consolidation_func() -> String {
    crate::series::DEFAULT_CONSOLIDATION.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nudge_start_time_on_aggregation: default_nudge(),
            max_data_points: None,
            default_consolidation_func: default_consolidation_func(),
            default_x_files_factor: 0.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from the first default location that exists, else the environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("graphex").join("config.toml")),
            Some(PathBuf::from("/etc/graphex/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "loaded config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to load config");
                    }
                }
            }
        }

        tracing::debug!("using default config with environment overrides");
        Self::from_env()
    }

    /// Apply `GRAPHEX_*` environment variables; unparsable values are ignored
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(nudge) = var("GRAPHEX_NUDGE_START_TIME").and_then(|v| v.parse().ok()) {
            self.engine.nudge_start_time_on_aggregation = nudge;
        }
        if let Some(mdp) = var("GRAPHEX_MAX_DATA_POINTS").and_then(|v| v.parse().ok()) {
            self.engine.max_data_points = Some(mdp);
        }
        if let Some(func) = var("GRAPHEX_CONSOLIDATION_FUNC") {
            self.engine.default_consolidation_func = func;
        }
        if let Some(xff) = var("GRAPHEX_X_FILES_FACTOR").and_then(|v| v.parse().ok()) {
            self.engine.default_x_files_factor = xff;
        }

        if let Some(level) = var("GRAPHEX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("GRAPHEX_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(file) = var("GRAPHEX_LOG_FILE") {
            self.logging.file = Some(file);
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Graphex Configuration
#
# Environment variables override these settings:
# - GRAPHEX_NUDGE_START_TIME
# - GRAPHEX_MAX_DATA_POINTS
# - GRAPHEX_CONSOLIDATION_FUNC
# - GRAPHEX_X_FILES_FACTOR
# - GRAPHEX_LOG_LEVEL
# - GRAPHEX_LOG_FORMAT
# - GRAPHEX_LOG_FILE

[engine]
# Snap consolidated series to a multiple of the new step
nudge_start_time_on_aggregation = true

# Downsample results to at most this many points
# max_data_points = 800

# Reducer for fixtures that don't set consolidationFunc
default_consolidation_func = "average"

# Minimum ratio of present samples per consolidated bucket
default_x_files_factor = 0.0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/graphex/graphex.log"
"#
    .to_string()
}
