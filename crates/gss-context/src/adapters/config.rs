//! TOML-backed [`ConfigProvider`].
//!
//! ```toml
//! [manager]
//! default_mechanism = "1.2.840.113554.1.2.2"
//! use_native = false
//! ```
//!
//! Missing keys keep their [`ManagerConfig::default`] values.

use crate::domain::ManagerConfig;
use crate::ports::ConfigProvider;
use gss_types::Oid;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    manager: ManagerSection,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManagerSection {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    default_mechanism: Option<Oid>,

    #[serde(default)]
    use_native: Option<bool>,
}

/// Configuration provider reading a TOML document.
#[derive(Debug, Clone)]
pub struct TomlConfigProvider {
    config: ManagerConfig,
}

impl TomlConfigProvider {
    /// Read and parse the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let provider = Self::parse(&content)?;
        info!(
            path = %path.display(),
            default_mechanism = %provider.config.default_mechanism,
            use_native = provider.config.use_native,
            "[Config] Loaded manager configuration"
        );
        Ok(provider)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = ManagerConfig::default();
        if let Some(mechanism) = file.manager.default_mechanism {
            config = config.with_default_mechanism(mechanism);
        }
        if let Some(use_native) = file.manager.use_native {
            config = config.with_native(use_native);
        }
        Ok(Self { config })
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn manager_config(&self) -> ManagerConfig {
        self.config.clone()
    }
}
