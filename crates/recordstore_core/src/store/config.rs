//! Storage configuration for one persistence handle.
//!
//! # Invariants
//! - `in_memory_only` wins over `location`.
//! - A file-backed store always names its backing file.

use crate::store::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where and how a handle stores its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub in_memory_only: bool,
    pub location: Option<PathBuf>,
    pub allows_save: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            in_memory_only: false,
            location: None,
            allows_save: true,
        }
    }
}

/// Resolved storage target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StorageBacking {
    Memory,
    File(PathBuf),
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self {
            in_memory_only: true,
            ..Self::default()
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(path.into()),
            ..Self::default()
        }
    }

    /// Disallows saves through every session of the handle.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.allows_save = false;
        self
    }

    /// Parses a TOML document with `in_memory_only`, `location` and
    /// `allows_save` keys; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(content)
            .map_err(|err| ConfigurationError::InvalidStorage(format!("invalid toml: {err}")))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub(crate) fn backing(&self) -> Result<StorageBacking, ConfigurationError> {
        if self.in_memory_only {
            return Ok(StorageBacking::Memory);
        }

        match &self.location {
            Some(path) if path.as_os_str().is_empty() => Err(ConfigurationError::InvalidStorage(
                "location cannot be empty".to_string(),
            )),
            Some(path) => Ok(StorageBacking::File(path.clone())),
            None => Err(ConfigurationError::InvalidStorage(
                "file-backed storage requires a location".to_string(),
            )),
        }
    }
}
