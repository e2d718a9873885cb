//! Hot-swappable handle to a fully built [`MapFile`].
//!
//! Readers take a snapshot (`Arc<MapFile>`) and run lookups against it
//! without holding any lock. A reload builds a brand-new map off to the side
//! and only then replaces the published one, so a lookup sees either the
//! old map or the new one, never a partially loaded map.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use super::{LoadReport, MapFile};
use crate::config::MapConfig;
use crate::errors::ConfigError;

/// Shared, reloadable mapfile.
#[derive(Debug, Clone)]
pub struct SharedMapFile {
    current: Arc<RwLock<Arc<MapFile>>>,
}

impl Default for SharedMapFile {
    fn default() -> Self {
        Self::new(MapFile::new())
    }
}

impl SharedMapFile {
    pub fn new(map: MapFile) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(map))),
        }
    }

    /// Build the initial map from `config`.
    pub fn from_config(config: &MapConfig) -> Result<(Self, LoadReport), ConfigError> {
        let (map, report) = MapFile::from_config(config)?;
        Ok((Self::new(map), report))
    }

    /// The currently published map.
    pub fn snapshot(&self) -> Arc<MapFile> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Publish `map`, returning the one it replaces.
    pub fn swap(&self, map: MapFile) -> Arc<MapFile> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(map))
    }

    /// Rebuild from `config` and publish the result. On a configuration
    /// error the current map stays in place.
    pub fn reload(&self, config: &MapConfig) -> Result<LoadReport, ConfigError> {
        let (map, report) = MapFile::from_config(config)?;
        self.swap(map);
        info!(rules = report.rules_added, "mapfile reloaded");
        Ok(report)
    }

    pub fn canonicalize(&self, method: &str, principal: &str) -> Option<String> {
        self.snapshot().canonicalize(method, principal)
    }

    pub fn resolve_user(&self, canonical: &str) -> Option<String> {
        self.snapshot().resolve_user(canonical)
    }
}
