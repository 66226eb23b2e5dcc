//! Service configuration.
//!
//! Resolved once at startup from, lowest precedence first: built-in
//! defaults, an optional TOML file, `INDEX_ATTEST_*` environment variables
//! (`__` separates nested keys) and command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use index_attest_core::DEFAULT_CHUNK_SIZE;
use index_attest_store::{MSGINDEX_DB_NAME, REPO_DB_NAME};

use crate::error::{AttestError, Result};

/// Prefix of environment variables read into the configuration.
pub const ENV_PREFIX: &str = "INDEX_ATTEST_";

/// Checksum pipeline settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig {
    /// Run the checksum pipeline.
    pub enabled: bool,
    /// Epochs per chunk.
    pub chunk_size: u64,
    /// Scan the repository and source for gaps at startup when the
    /// repository already existed.
    pub check_for_gaps: bool,
    /// Seconds to wait before retrying a chunk that is not ready.
    pub poll_interval_secs: u64,
    /// Epochs the source head must be past a chunk before it is hashed.
    pub finality_margin: u64,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            check_for_gaps: false,
            poll_interval_secs: 30,
            finality_margin: 0,
        }
    }
}

/// Location of the source message index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory containing `msgindex.db`.
    pub db_dir: Option<PathBuf>,
}

/// Location of the checksum repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Directory containing (or to contain) `checksums.db`.
    pub db_dir: Option<PathBuf>,
}

/// RPC server settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 8087,
        }
    }
}

impl ServerConfig {
    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Append logs to this file instead of stdout.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Full service configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestConfig {
    pub checksum: ChecksumConfig,
    pub source: SourceConfig,
    pub repo: RepoConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

/// Values given on the command line. `None` leaves the loaded value alone.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub repo_dir: Option<PathBuf>,
    pub chunk_size: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut AttestConfig) {
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(file) = &self.log_file {
            config.log.file = Some(file.clone());
        }
        if let Some(dir) = &self.source_dir {
            config.source.db_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.repo_dir {
            config.repo.db_dir = Some(dir.clone());
        }
        if let Some(size) = self.chunk_size {
            config.checksum.chunk_size = size;
        }
    }
}

impl AttestConfig {
    /// The provider stack without command-line overrides.
    ///
    /// A configuration file must exist and carry a `.toml` extension.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new();

        if let Some(path) = file {
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                return Err(AttestError::InvalidConfig(format!(
                    "config file must have a .toml extension: {}",
                    path.display()
                )));
            }
            if !path.is_file() {
                return Err(AttestError::InvalidConfig(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "loading configuration file");
            figment = figment.merge(Toml::file(path));
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["config"])))
    }

    /// Extract a configuration from any provider stack.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }

    /// Load from file and environment, then apply command-line overrides.
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = Self::from_figment(&Self::figment(file)?)?;
        overrides.apply(&mut config);
        Ok(config)
    }

    /// Check the settings needed to run the service.
    pub fn validate(&self) -> Result<()> {
        crate::telemetry::level_filter(&self.log.level)?;
        if self.checksum.chunk_size == 0 {
            return Err(AttestError::InvalidConfig(
                "checksum.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.checksum.enabled {
            self.source_dir()?;
            self.repo_dir()?;
        }
        if self.server.enabled {
            self.repo_dir()?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.checksum.poll_interval_secs)
    }

    pub fn source_dir(&self) -> Result<&Path> {
        self.source.db_dir.as_deref().ok_or_else(|| {
            AttestError::InvalidConfig("source.db_dir is required".to_string())
        })
    }

    pub fn repo_dir(&self) -> Result<&Path> {
        self.repo.db_dir.as_deref().ok_or_else(|| {
            AttestError::InvalidConfig("repo.db_dir is required".to_string())
        })
    }

    /// Full path of the source `msgindex.db`.
    pub fn source_path(&self) -> Result<PathBuf> {
        Ok(self.source_dir()?.join(MSGINDEX_DB_NAME))
    }

    /// Full path of the repository `checksums.db`.
    pub fn repo_path(&self) -> Result<PathBuf> {
        Ok(self.repo_dir()?.join(REPO_DB_NAME))
    }
}
