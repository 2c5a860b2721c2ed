//! Server configuration.
//!
//! Values come from, in order of precedence: command-line flags, environment
//! variables, an optional YAML file, and built-in defaults.
//!
//! ```yaml
//! listen: 0.0.0.0:4221
//! directory: /srv/files
//! read_timeout_secs: 120
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4221";
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: String,
    /// Root for `/files/*`. `None` means every file request is a 404.
    pub directory: Option<PathBuf>,
    /// Idle limit for a single read on a connection.
    pub read_timeout: Duration,
}

/// Command-line flags. Each one can also be set from a `PLAINHTTP_`-prefixed
/// environment variable, e.g. `PLAINHTTP_DIRECTORY`.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "plainhttp", about = "Minimal HTTP/1.1 server over raw TCP")]
pub struct Cli {
    /// Directory served under /files/
    #[arg(long, env = "PLAINHTTP_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "PLAINHTTP_LISTEN")]
    pub listen: Option<String>,

    /// Seconds to wait for request bytes before dropping the connection
    #[arg(long = "read-timeout-secs", env = "PLAINHTTP_READ_TIMEOUT_SECS")]
    pub read_timeout_secs: Option<u64>,

    /// YAML configuration file
    #[arg(long, env = "PLAINHTTP_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Shape of the YAML configuration file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<String>,
    pub directory: Option<PathBuf>,
    pub read_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            directory: None,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Loads configuration for the running process.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    /// Merges parsed flags over the YAML file they point at, if any.
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };

        Ok(Self::merge(cli, file))
    }

    /// Builds a config from a string-keyed mapping.
    ///
    /// Recognized keys: `directory`, `listen`, `read_timeout_secs`. An empty
    /// `directory` value is treated as absent.
    pub fn from_map(map: &HashMap<String, String>) -> anyhow::Result<Self> {
        let read_timeout_secs = map
            .get("read_timeout_secs")
            .map(|v| {
                v.parse::<u64>()
                    .with_context(|| format!("invalid read_timeout_secs: {:?}", v))
            })
            .transpose()?;

        let file = FileConfig {
            listen: map.get("listen").cloned(),
            directory: map.get("directory").map(PathBuf::from),
            read_timeout_secs,
        };

        Ok(Self::merge(Cli::default(), file))
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn merge(cli: Cli, file: FileConfig) -> Self {
        let defaults = Self::default();

        let directory = cli
            .directory
            .or(file.directory)
            .filter(|d| !d.as_os_str().is_empty());

        let read_timeout = cli
            .read_timeout_secs
            .or(file.read_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.read_timeout);

        Self {
            listen_addr: cli.listen.or(file.listen).unwrap_or(defaults.listen_addr),
            directory,
            read_timeout,
        }
    }
}

impl FileConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}
