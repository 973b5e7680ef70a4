//! Agent configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! command-line flags and `INNOSTAT_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use innostat_core::{PollerOptions, UnresolvedPolicy};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Default MySQL URL: local server over its unix socket.
pub const DEFAULT_DSN: &str = "mysql://root@localhost/?socket=/var/run/mysqld/mysqld.sock";

/// Default location of the SQLite database.
pub const DEFAULT_DATABASE: &str = "./current.db";

/// Main agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// MySQL connection URL of the monitored server.
    pub dsn: String,
    /// Delay between two consecutive polls.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Also print each poll's measurements as one JSON line on stdout.
    pub json: bool,
    /// Path of the local SQLite database.
    pub database: PathBuf,
    /// Handling of metric names that appear after startup.
    pub unresolved: UnresolvedPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            dsn: DEFAULT_DSN.to_string(),
            interval: Duration::from_secs(1),
            json: false,
            database: PathBuf::from(DEFAULT_DATABASE),
            unresolved: UnresolvedPolicy::Register,
        }
    }
}

/// Values given on the command line; `None` keeps the lower layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--dsn`.
    pub dsn: Option<String>,
    /// `--sleep`.
    pub interval: Option<Duration>,
    /// `--json`.
    pub json: Option<bool>,
    /// `--database`.
    pub database: Option<PathBuf>,
    /// `--unresolved`.
    pub unresolved: Option<UnresolvedPolicy>,
}

impl PollConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgentError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, AgentError> {
        toml::from_str(content).map_err(|e| AgentError::Config(format!("invalid TOML: {e}")))
    }

    /// Builds the effective configuration: defaults, then `file`, then
    /// `overrides`, then validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result is invalid.
    pub fn resolve(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, AgentError> {
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.with_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(dsn) = overrides.dsn {
            self.dsn = dsn;
        }
        if let Some(interval) = overrides.interval {
            self.interval = interval;
        }
        if let Some(json) = overrides.json {
            self.json = json;
        }
        if let Some(database) = overrides.database {
            self.database = database;
        }
        if let Some(unresolved) = overrides.unresolved {
            self.unresolved = unresolved;
        }
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.dsn.trim().is_empty() {
            return Err(AgentError::Config("dsn cannot be empty".to_string()));
        }

        if !self.dsn.starts_with("mysql://") {
            return Err(AgentError::Config(
                "dsn must be a mysql:// URL".to_string(),
            ));
        }

        if self.interval.is_zero() {
            return Err(AgentError::Config(
                "interval must be greater than zero".to_string(),
            ));
        }

        if self.database.as_os_str().is_empty() {
            return Err(AgentError::Config(
                "database path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The DSN with any password replaced, for logging.
    #[must_use]
    pub fn redacted_dsn(&self) -> String {
        let Some(rest) = self.dsn.strip_prefix("mysql://") else {
            return self.dsn.clone();
        };
        let Some(at) = rest.find('@') else {
            return self.dsn.clone();
        };
        let (userinfo, host) = rest.split_at(at);
        match userinfo.split_once(':') {
            Some((user, _)) => format!("mysql://{user}:***{host}"),
            None => self.dsn.clone(),
        }
    }

    /// Poller settings derived from this configuration.
    #[must_use]
    pub const fn poller_options(&self) -> PollerOptions {
        PollerOptions {
            interval: self.interval,
            json_output: self.json,
            unresolved: self.unresolved,
        }
    }
}
