//! Configuration file (assetline.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use assetline_pipeline::PathSpec;
use assetline_server::DevServerConfig;
use serde::Deserialize;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct PathsConfig {
    #[serde(default = "default_source")]
    pub source: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            output: default_output(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub open: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: false,
        }
    }
}

fn default_source() -> PathBuf {
    PathBuf::from("src")
}
fn default_output() -> PathBuf {
    PathBuf::from("dist")
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}

impl ConfigFile {
    /// The path table for the configured roots.
    pub fn path_spec(&self) -> PathSpec {
        PathSpec::new(&self.paths.source, &self.paths.output)
    }

    pub fn server_config(&self) -> DevServerConfig {
        DevServerConfig {
            root: self.paths.output.clone(),
            port: self.server.port,
            host: self.server.host.clone(),
            open: self.server.open,
        }
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!("No {}, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}
