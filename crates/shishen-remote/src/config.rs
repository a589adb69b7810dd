//! Connection settings injected into `SshChannel`.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// How the remote host key is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Host must already be in known_hosts.
    #[default]
    Verify,
    /// Unknown hosts are recorded on first contact, changed keys rejected.
    AcceptNew,
    /// No verification at all. Only for throwaway hosts.
    Bypass,
}

impl HostKeyPolicy {
    /// `-o` options passed to ssh and scp.
    #[must_use]
    pub fn ssh_options(self) -> Vec<String> {
        match self {
            Self::Verify => vec!["StrictHostKeyChecking=yes".to_string()],
            Self::AcceptNew => vec!["StrictHostKeyChecking=accept-new".to_string()],
            Self::Bypass => vec![
                "StrictHostKeyChecking=no".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ],
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Verify => "verify",
            Self::AcceptNew => "accept-new",
            Self::Bypass => "bypass",
        })
    }
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verify" | "yes" | "strict" => Ok(Self::Verify),
            "accept-new" => Ok(Self::AcceptNew),
            "bypass" | "no" | "off" => Ok(Self::Bypass),
            other => Err(format!("unknown host key policy: {other}")),
        }
    }
}

/// Remote host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Remote host name or address.
    pub host: String,
    /// Remote login user.
    pub user: String,
    /// SSH port, if not the default.
    pub port: Option<u16>,
    /// Private key used for authentication.
    pub identity_file: Option<PathBuf>,
    pub host_key_policy: HostKeyPolicy,
    /// Seconds ssh waits for the TCP connection.
    pub connect_timeout_secs: u64,
    /// ssh executable, resolved on PATH unless absolute.
    pub ssh_program: String,
    /// scp executable, resolved on PATH unless absolute.
    pub scp_program: String,
    /// Where payloads are staged before copying; system temp dir if unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: "root".to_string(),
            port: None,
            identity_file: None,
            host_key_policy: HostKeyPolicy::default(),
            connect_timeout_secs: 10,
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            staging_dir: None,
        }
    }
}

impl SshConfig {
    /// Create a config for `user@host` with default policy.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    /// Set the private key.
    #[must_use]
    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Set the host key policy.
    #[must_use]
    pub const fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// `user@host` as ssh expects it.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Staging directory for outbound payloads.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
