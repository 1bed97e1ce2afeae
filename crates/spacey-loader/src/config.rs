// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. the user config, `<config dir>/spacey-fragments/config.toml`
//! 3. the project config, `./spacey-fragments.toml` (or an explicit file)
//! 4. `SPACEY_FRAGMENTS_*` environment variables
//!
//! Command-line flags are applied on top by the caller through [`LoaderConfig::set`].

use crate::error::{ConfigError, Error, Result};
use crate::import_map::ImportMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// File name of the project config
pub const PROJECT_CONFIG_FILE: &str = "spacey-fragments.toml";

const ENV_PREFIX: &str = "SPACEY_FRAGMENTS_";

/// Configuration for a loader realm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Import map JSON file
    pub import_map: Option<PathBuf>,

    /// Maximum number of resources fetched at once; 0 means unbounded
    pub max_concurrent_fetches: usize,

    /// Whether `http(s)` URLs may be fetched
    pub allow_remote: bool,

    /// Remote request timeout in seconds
    pub timeout: u64,

    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            import_map: None,
            max_concurrent_fetches: 16,
            allow_remote: false,
            timeout: 30,
            log_level: "warn".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from the default locations.
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, reading `project` instead of `./spacey-fragments.toml`
    /// when given.
    pub fn load_with(project: Option<&Path>) -> Result<Self> {
        let mut config = LoaderConfig::default();

        if let Some(path) = user_config_path() {
            if path.exists() {
                config.merge_from_file(&path)?;
            }
        }

        match project {
            Some(path) => config.merge_from_file(path)?,
            None => {
                let path = PathBuf::from(PROJECT_CONFIG_FILE);
                if path.exists() {
                    config.merge_from_file(&path)?;
                }
            }
        }

        config.load_from_env()?;
        Ok(config)
    }

    /// Merge settings from a TOML file. Relative import map paths are taken
    /// relative to the file.
    pub fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "reading loader config");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })?;

        for (key, value) in &table {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.set(key, &value)?;
        }

        if let (Some(import_map), Some(dir)) = (&self.import_map, path.parent()) {
            if table.contains_key("import_map") && import_map.is_relative() {
                self.import_map = Some(dir.join(import_map));
            }
        }
        Ok(())
    }

    fn load_from_env(&mut self) -> Result<()> {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                self.set(&config_key.to_lowercase(), &value)?;
            }
        }
        Ok(())
    }

    /// Set a configuration value. Keys accept `-` or `_` as separator.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || {
            Error::from(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        };

        match key.replace('-', "_").as_str() {
            "import_map" => {
                self.import_map = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "max_concurrent_fetches" => {
                self.max_concurrent_fetches = value.parse().map_err(|_| invalid())?;
            }
            "allow_remote" => self.allow_remote = parse_bool(value).ok_or_else(invalid)?,
            "timeout" => self.timeout = value.parse().map_err(|_| invalid())?,
            "log_level" => self.log_level = value.to_string(),
            _ => warn!(key, "ignoring unknown config key"),
        }
        Ok(())
    }

    /// Get a configuration value as text.
    pub fn get(&self, key: &str) -> Option<String> {
        match key.replace('-', "_").as_str() {
            "import_map" => self.import_map.as_ref().map(|p| p.display().to_string()),
            "max_concurrent_fetches" => Some(self.max_concurrent_fetches.to_string()),
            "allow_remote" => Some(self.allow_remote.to_string()),
            "timeout" => Some(self.timeout.to_string()),
            "log_level" => Some(self.log_level.clone()),
            _ => None,
        }
    }

    /// Read the configured import map, if any.
    pub fn read_import_map(&self) -> Result<Option<ImportMap>> {
        let Some(path) = &self.import_map else {
            return Ok(None);
        };

        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::ImportMap {
            path: path.display().to_string(),
            source,
        })?;
        let base_url = file_url(path)?;
        Ok(Some(ImportMap::from_json(&json, &base_url)?))
    }
}

/// Path of the per-user config file
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("spacey-fragments").join("config.toml"))
}

/// `file://` URL for a local path, made absolute against the working directory
pub fn file_url(path: &Path) -> Result<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?
            .join(path)
    };

    Url::from_file_path(&absolute).map_err(|_| {
        Error::from(ConfigError::InvalidValue {
            key: "path".to_string(),
            value: absolute.display().to_string(),
        })
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
