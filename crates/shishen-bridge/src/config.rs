//! Bridge configuration: TOML file plus environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shishen_remote::{HostKeyPolicy, SshConfig};
use thiserror::Error;

use crate::waiter::WaitConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SHISHEN_CONFIG";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fixed locations of the three shared files on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePaths {
    /// Single-slot mailbox the agent reads pulses from.
    pub breath_log: String,
    /// Append-only log the agent writes replies to.
    pub response_log: String,
    /// The agent's status fields.
    pub memory_snapshot: String,
}

impl Default for RemotePaths {
    fn default() -> Self {
        Self {
            breath_log: "/opt/shishen-final-edition/breath_log.json".to_string(),
            response_log: "/opt/shishen-final-edition/messages-to-manus.jsonl".to_string(),
            memory_snapshot: "/opt/shishen-final-edition/shishen-unified-memory.json".to_string(),
        }
    }
}

/// Everything the bridge needs to talk to one remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub remote: SshConfig,
    pub paths: RemotePaths,
    pub wait: WaitConfig,
    /// Reply shown when the agent has not answered before the deadline.
    pub pending_response: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            remote: SshConfig::default(),
            paths: RemotePaths::default(),
            wait: WaitConfig::default(),
            pending_response: "Shishen is still breathing with your message. The reply will appear here shortly."
                .to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document. No overrides, no validation.
    ///
    /// # Errors
    /// Returns error if the document is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load `path`, apply environment overrides and validate.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or the result is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load `path`, apply overrides from `lookup` and validate.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or the result is
    /// invalid.
    pub fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load from `$SHISHEN_CONFIG`, else `<config dir>/shishen/bridge.toml`,
    /// else defaults; then environment overrides and validation.
    ///
    /// # Errors
    /// Returns error if a config file exists but is unusable, or the result
    /// is invalid.
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty()) {
            return Self::load(Path::new(&path));
        }

        if let Some(path) = default_config_path().filter(|p| p.is_file()) {
            return Self::load(&path);
        }

        tracing::debug!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHISHEN_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key/value source.
    ///
    /// Empty and unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("SHISHEN_HOST") {
            self.remote.host = host;
        }
        if let Some(user) = get("SHISHEN_USER") {
            self.remote.user = user;
        }
        if let Some(port) = get("SHISHEN_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.remote.port = Some(port);
        }
        if let Some(key) = get("SHISHEN_SSH_KEY") {
            self.remote.identity_file = Some(PathBuf::from(key));
        }
        if let Some(policy) = get("SHISHEN_HOST_KEY_POLICY") {
            match policy.parse::<HostKeyPolicy>() {
                Ok(policy) => self.remote.host_key_policy = policy,
                Err(e) => tracing::warn!("Ignoring SHISHEN_HOST_KEY_POLICY: {e}"),
            }
        }
        if let Some(ms) = get("SHISHEN_WAIT_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.wait.timeout_ms = ms;
        }
        if let Some(ms) = get("SHISHEN_POLL_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.wait.poll_interval_ms = ms;
        }
    }

    /// Reject configurations the bridge cannot work with.
    ///
    /// # Errors
    /// Returns error describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.host.trim().is_empty() {
            return Err(ConfigError::Invalid("remote.host is empty (set SHISHEN_HOST)".to_string()));
        }
        if self.remote.user.trim().is_empty() {
            return Err(ConfigError::Invalid("remote.user is empty".to_string()));
        }
        if self.wait.timeout_ms == 0 {
            return Err(ConfigError::Invalid("wait.timeout_ms must be positive".to_string()));
        }
        if self.wait.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("wait.poll_interval_ms must be positive".to_string()));
        }
        if self.wait.scan_depth == 0 {
            return Err(ConfigError::Invalid("wait.scan_depth must be positive".to_string()));
        }
        for (name, path) in [
            ("paths.breath_log", &self.paths.breath_log),
            ("paths.response_log", &self.paths.response_log),
            ("paths.memory_snapshot", &self.paths.memory_snapshot),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!("{name} must be an absolute path, got {path:?}")));
            }
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("shishen").join("bridge.toml"))
}
