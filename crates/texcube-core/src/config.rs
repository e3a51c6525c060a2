// SPDX-License-Identifier: CEPL-1.0
//! `texcube.toml` loading.
//!
//! Every field has a default so a partial file (or no file at all) still
//! yields a usable configuration.

use serde::Deserialize;
use std::{fs, io, path::Path, path::PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "texcube".to_owned(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    /// Force the staged (device-local) texture upload even when linear
    /// sampling is available.
    pub use_staging: bool,
    /// Degrees added to the model rotation every frame.
    pub spin_increment: f32,
    pub validation: bool,
    pub texture: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            use_staging: false,
            spin_increment: 0.01,
            validation: cfg!(debug_assertions),
            texture: None,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

fn default_clear() -> [f32; 4] {
    [0.2, 0.2, 0.2, 0.2]
}

impl AppCfg {
    pub fn from_toml_str(s: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s, path)
    }
}

/// Missing file means defaults; a broken file is reported and also falls
/// back to defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match AppCfg::read(path) {
        Ok(cfg) => cfg,
        Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            AppCfg::default()
        }
        Err(e) => {
            warn!("{e}; using defaults");
            AppCfg::default()
        }
    }
}
