//! Error types for the mapfile core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.
//!
//! Lookup misses are not errors: canonicalization and user resolution
//! return `Option`.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    MapFile(#[from] MapFileError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Mapfile errors
// ---------------------------------------------------------------------------

/// Errors that stop a mapfile source from loading.
///
/// Per-line problems (malformed lines, bad regexes, rejected includes) are
/// logged and counted in a `LoadReport` instead.
#[derive(Debug, Error)]
pub enum MapFileError {
    /// The mapfile could not be opened. Nothing was loaded from it.
    #[error("could not open mapfile '{path}': {source}", path = .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the source failed part way through. Lines before the
    /// failure stay loaded.
    #[error("error reading mapfile '{source_name}': {source}")]
    Read {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// A user-map line has no user field. Loading of that source stops at
    /// this line.
    #[error("error parsing line {line} of usermap '{source_name}'")]
    MalformedUsermapLine { source_name: String, line: usize },
}

impl MapFileError {
    /// Line number for [`MapFileError::MalformedUsermapLine`].
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedUsermapLine { line, .. } => Some(*line),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
