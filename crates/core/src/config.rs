//! TOML-based configuration for loading mapfiles.
//!
//! ```toml
//! log_level = "info"
//!
//! [canonical]
//! files = ["/etc/condor/certificate_mapfile"]
//! assume_literal = true
//! allow_include = true
//!
//! [usermap]
//! files = ["/etc/condor/usermap"]
//! assume_literal = true
//!
//! [include]
//! exclude_regexp = '^((\..*)|(.*~)|(#.*)|(.*\.rpmsave)|(.*\.rpmnew))$'
//! ```

use std::path::{Path, PathBuf};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::mapfile::include::{FsDirLister, DEFAULT_EXCLUDE_REGEXP};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Canonicalization (method, principal -> canonical) sources.
    #[serde(default)]
    pub canonical: CanonicalConfig,

    /// User map (canonical -> local account) sources.
    #[serde(default)]
    pub usermap: UsermapConfig,

    /// `@include` directory handling.
    #[serde(default)]
    pub include: IncludeConfig,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            canonical: CanonicalConfig::default(),
            usermap: UsermapConfig::default(),
            include: IncludeConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Canonicalization file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalConfig {
    /// Files loaded in order into one method table.
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Treat principals as literals unless written `/regex/`. When false,
    /// every principal is compiled as a regular expression.
    #[serde(default = "default_true")]
    pub assume_literal: bool,

    /// Honor `@include` directives in the top-level files.
    #[serde(default = "default_true")]
    pub allow_include: bool,
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            assume_literal: true,
            allow_include: true,
        }
    }
}

/// User map file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsermapConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,

    #[serde(default = "default_true")]
    pub assume_literal: bool,
}

impl Default for UsermapConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            assume_literal: true,
        }
    }
}

/// Settings for directories pulled in with `@include`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludeConfig {
    /// File names matching this regex are skipped. An empty string
    /// disables filtering.
    #[serde(default = "default_exclude_regexp")]
    pub exclude_regexp: String,
}

fn default_exclude_regexp() -> String {
    DEFAULT_EXCLUDE_REGEXP.into()
}

impl Default for IncludeConfig {
    fn default() -> Self {
        Self {
            exclude_regexp: default_exclude_regexp(),
        }
    }
}

impl IncludeConfig {
    /// Directory lister honoring `exclude_regexp`.
    pub fn dir_lister(&self) -> Result<FsDirLister, ConfigError> {
        if self.exclude_regexp.is_empty() {
            return Ok(FsDirLister::with_exclude(None));
        }
        let re = Regex::new(&self.exclude_regexp).map_err(|e| ConfigError::InvalidValue {
            field: "include.exclude_regexp".into(),
            detail: e.to_string(),
        })?;
        Ok(FsDirLister::with_exclude(Some(re)))
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl MapConfig {
    /// Load a [`MapConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: MapConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log_level".into(),
                detail: "log level must not be empty".into(),
            });
        }
        self.include.dir_lister()?;
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}
