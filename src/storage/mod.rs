//! Storage Layer
//!
//! Per-instance side files in the module configuration directory: the user
//! pattern dictionary, the engine config file pointing at it, and the
//! rendered mask image.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not determine configuration directory")]
    NoConfigDir,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Get the module configuration directory, creating it if needed
pub fn get_config_dir() -> Result<PathBuf, StorageError> {
    let proj_dirs = directories::ProjectDirs::from("com", "ocrsampler", "OcrSampler")
        .ok_or(StorageError::NoConfigDir)?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    fs::create_dir_all(&config_dir).map_err(|e| StorageError::io(&config_dir, e))?;

    Ok(config_dir)
}

/// Side files of pipeline instances, rooted in one directory
#[derive(Debug, Clone)]
pub struct PluginFiles {
    dir: PathBuf,
}

impl PluginFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Files rooted in the default configuration directory
    pub fn in_config_dir() -> Result<Self, StorageError> {
        Ok(Self::new(get_config_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn patterns_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("user-patterns-{id}.txt"))
    }

    pub fn patterns_config_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("user-patterns-{id}.config"))
    }

    pub fn mask_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))
    }

    /// Persist user patterns and the engine config file referencing them.
    ///
    /// Returns the config file path to pass to the engine, or `None` when
    /// `patterns` is empty (nothing is written in that case).
    pub fn write_user_patterns(
        &self,
        id: &str,
        patterns: &str,
    ) -> Result<Option<PathBuf>, StorageError> {
        if patterns.is_empty() {
            return Ok(None);
        }
        self.ensure_dir()?;

        let patterns_path = self.patterns_path(id);
        info!("Saving user patterns to: {}", patterns_path.display());
        fs::write(&patterns_path, patterns).map_err(|e| StorageError::io(&patterns_path, e))?;

        let config_path = self.patterns_config_path(id);
        info!("Saving user patterns config to: {}", config_path.display());
        let absolute = patterns_path
            .canonicalize()
            .unwrap_or_else(|_| patterns_path.clone());
        fs::write(
            &config_path,
            format!("user_patterns_file {}\n", absolute.display()),
        )
        .map_err(|e| StorageError::io(&config_path, e))?;

        Ok(Some(config_path))
    }

    /// Remove every side file belonging to `id`. Missing files are fine.
    pub fn cleanup(&self, id: &str) -> Result<(), StorageError> {
        let mut first_error = None;
        for path in [
            self.patterns_path(id),
            self.patterns_config_path(id),
            self.mask_path(id),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    first_error.get_or_insert(StorageError::io(&path, e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
