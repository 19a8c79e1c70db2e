// Configuration loading.
//
// Values are resolved with the following priority (highest first):
// 1. CLI arguments
// 2. Environment variables
// 3. TOML configuration file
// 4. Default values
//
// The file lives at `$XDG_CONFIG_HOME/sketch-solver/config.toml` unless a
// path is given explicitly.
//
// ```toml
// api_key = "..."
// model = "gemini-2.0-flash"
// width = 900
// height = 600
// device_pixel_ratio = 1.0
// max_history = 50
// export_dir = "./exports"
// result_html = "/tmp/sketch-solver-result.html"
// log_level = "info"
// ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::history::DEFAULT_MAX_HISTORY;
use crate::solver::{DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_MODEL: &str = "SKETCH_SOLVER_MODEL";
pub const ENV_BASE_URL: &str = "SKETCH_SOLVER_BASE_URL";

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// The file as written; every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub device_pixel_ratio: Option<f32>,
    pub max_history: Option<usize>,
    pub export_dir: Option<PathBuf>,
    pub result_html: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved settings.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
    pub max_history: usize,
    pub export_dir: PathBuf,
    pub result_html: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            width: 900,
            height: 600,
            device_pixel_ratio: 1.0,
            max_history: DEFAULT_MAX_HISTORY,
            export_dir: PathBuf::from("."),
            result_html: None,
            log_level: "info".to_string(),
        }
    }
}

/// Default location of the config file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sketch-solver").join("config.toml"))
}

impl Config {
    /// Load from `path`, or from the default location if that exists.
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some(read_file(p)?),
            None => match default_config_path() {
                Some(p) if p.exists() => Some(read_file(&p)?),
                _ => None,
            },
        };

        let mut config = Self::default();
        if let Some(file) = file {
            config.apply_file(file);
        }
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let mut config = Self::default();
        config.apply_file(file);
        Ok(config)
    }

    pub fn apply_file(&mut self, file: ConfigFile) {
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if let Some(v) = file.model {
            self.model = v;
        }
        if let Some(v) = file.base_url {
            self.base_url = v;
        }
        if let Some(v) = file.width {
            self.width = v;
        }
        if let Some(v) = file.height {
            self.height = v;
        }
        if let Some(v) = file.device_pixel_ratio {
            self.device_pixel_ratio = v;
        }
        if let Some(v) = file.max_history {
            self.max_history = v;
        }
        if let Some(v) = file.export_dir {
            self.export_dir = v;
        }
        if file.result_html.is_some() {
            self.result_html = file.result_html;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Environment overrides through an arbitrary lookup. Empty values are
    /// treated as unset.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_API_KEY) {
            self.api_key = Some(v);
        }
        if let Some(v) = get(ENV_MODEL) {
            self.model = v;
        }
        if let Some(v) = get(ENV_BASE_URL) {
            self.base_url = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "surface size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.device_pixel_ratio > 0.0 && self.device_pixel_ratio <= 8.0) {
            return Err(ConfigError::ValidationError(format!(
                "device_pixel_ratio must be in (0, 8], got {}",
                self.device_pixel_ratio
            )));
        }
        if self.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "max_history must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}
