use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;
use serde::Deserialize;

use shared::errors::ConfigError;

/// Batch-run configuration: defaults the CLI falls back to when a flag is
/// absent. Loaded once at startup and never watched for changes — unlike
/// the long-lived agent this binary was adapted from, a decode run is a
/// single invocation with no config lifetime to manage.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Default cache bound `C`, used when `--cache` is absent.
    pub cache_limit: u32,
    /// Default log level, used when `-v`/`--verbose` is absent.
    pub log_level: String,
    /// Directory the logger writes rotating files into.
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_limit: image_core::DEFAULT_CACHE_LIMIT,
            log_level: "info".to_owned(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load and validate a `Config` from `path`, if given; otherwise return
    /// the defaults. A present-but-unreadable file is an error, a fully
    /// absent path is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let cfg = match path {
            Some(path) => {
                let s = fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                toml::from_str(&s).map_err(ConfigError::Parse)?
            }
            None => Config::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::Validation(format!("unknown log level: {}", self.log_level)))?;

        fs::create_dir_all(&self.log_dir).map_err(|e| ConfigError::Io {
            path: self.log_dir.clone(),
            source: e,
        })?;

        Ok(())
    }

    #[cfg(test)]
    pub fn from_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(toml).map_err(ConfigError::Parse)?;
        Ok(cfg)
    }
}
