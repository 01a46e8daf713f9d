//! Cross-platform application paths

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("could not determine the {0} directory")]
    NoBaseDir(&'static str),
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, PathError> {
        let data_dir = dirs::data_dir()
            .ok_or(PathError::NoBaseDir("data"))?
            .join("netviz");
        let config_dir = dirs::config_dir()
            .ok_or(PathError::NoBaseDir("config"))?
            .join("netviz");
        Self::at(data_dir, config_dir)
    }

    /// Paths rooted at explicit directories, created if missing.
    pub fn at(data_dir: PathBuf, config_dir: PathBuf) -> Result<Self, PathError> {
        for dir in [data_dir.join("models"), data_dir.join("frames"), config_dir.clone()] {
            fs::create_dir_all(&dir).map_err(|source| PathError::Create { path: dir, source })?;
        }
        Ok(Self {
            data_dir,
            config_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    /// Default target of `SaveFrame` when no path is given.
    pub fn frame_file(&self) -> PathBuf {
        self.data_dir.join("frames").join("latest.ppm")
    }
}
